//! SAE J1587 decoding on top of the J1708 serial link.
//! ## Example:
//! ```rust
//! use hdbus::decoder::Decoder;
//! use hdbus::j1587::{command, J1587Decoder};
//! use hdbus::metrics::{MetricTable, SPEED};
//!
//! let metrics = MetricTable::new();
//! let frame = command::encode_frame(128, 84, &[0x32]);
//! J1587Decoder::new().decode(&frame, &metrics).unwrap();
//! assert_eq!(metrics.get(SPEED), Some(50.0));
//! ```

pub mod assembler;
pub mod command;
pub mod constants;
pub mod error;

pub use assembler::FrameAssembler;

use chrono::Utc;
use tracing::{debug, warn};

use crate::decoder::{apply_signals, u32_be, Decoder, Reading, Signal};
use crate::dtc::{describe_fmi, DtcRecord, Protocol};
use crate::j1587::constants::*;
use crate::j1587::error::Error;
use crate::metrics::{self, MetricTable};

/// A single PID and its data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub pid: u8,
    pub data: Vec<u8>,
}

/// A checksummed J1587 message: the originating module followed by one or more parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub mid: u8,
    pub parameters: Vec<Parameter>,
}

impl Message {
    /// Validate the checksum and walk every PID/data block. Fails on the first malformed block.
    pub fn parse(frame: &[u8]) -> Result<Self, Error> {
        let (mid, body) = split_frame(frame)?;
        let parameters = ParameterIter::new(body)
            .map(|block| block.map(|(pid, data)| Parameter { pid, data: data.to_vec() }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { mid, parameters })
    }

    /// Serialize the message, inserting length bytes for variable length PIDs and appending the
    /// checksum.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut frame = vec![self.mid];
        for parameter in &self.parameters {
            let pid = parameter.pid;
            let len = parameter.data.len();
            match PidLength::from(pid) {
                PidLength::Single if len == 1 => frame.push(pid),
                PidLength::Double if len == 2 => frame.push(pid),
                PidLength::Variable if len <= u8::MAX as usize => frame.extend([pid, len as u8]),
                PidLength::Extended => return Err(Error::UnsupportedPid(pid)),
                _ => return Err(Error::InvalidLength(pid)),
            }
            frame.extend(&parameter.data);
        }
        frame.push(command::checksum(&frame));
        Ok(frame)
    }
}

/// Check length and checksum, returning the MID and the bytes between the MID and the checksum.
pub fn split_frame(frame: &[u8]) -> Result<(u8, &[u8]), Error> {
    if frame.len() < 2 {
        return Err(Error::FrameTooShort);
    }
    if !command::is_valid(frame) {
        return Err(Error::InvalidChecksum);
    }
    Ok((frame[0], &frame[1..frame.len() - 1]))
}

/// Walks the PID/data blocks of a message body. Stops after the first error.
pub struct ParameterIter<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> ParameterIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            done: false,
        }
    }

    fn fail(&mut self, error: Error) -> Option<Result<(u8, &'a [u8]), Error>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<'a> Iterator for ParameterIter<'a> {
    type Item = Result<(u8, &'a [u8]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }

        let pid = self.data[self.offset];
        self.offset += 1;

        let len = match PidLength::from(pid) {
            PidLength::Single => 1,
            PidLength::Double => 2,
            PidLength::Variable => match self.data.get(self.offset) {
                Some(&len) => {
                    self.offset += 1;
                    len as usize
                }
                None => return self.fail(Error::Truncated(pid)),
            },
            PidLength::Extended => return self.fail(Error::UnsupportedPid(pid)),
        };

        if self.offset + len > self.data.len() {
            return self.fail(Error::Truncated(pid));
        }

        let block = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Some(Ok((pid, block)))
    }
}

fn raw_byte(data: &[u8]) -> Reading {
    data.first().map_or(Reading::Missing, |&b| Reading::Value(b as f64))
}

fn temperature(data: &[u8]) -> Reading {
    data.first().map_or(Reading::Missing, |&b| Reading::Value(b as f64 - 40.0))
}

fn engine_rpm(data: &[u8]) -> Reading {
    match data {
        [hi, lo, ..] => Reading::Value((*hi as f64 * 256.0 + *lo as f64) / 8.0),
        _ => Reading::Missing,
    }
}

fn oil_pressure(data: &[u8]) -> Reading {
    data.first().map_or(Reading::Missing, |&b| Reading::Value(b as f64 * 4.0))
}

fn fuel_level(data: &[u8]) -> Reading {
    data.first().map_or(Reading::Missing, |&b| Reading::Value(b as f64 / 2.55))
}

fn battery_voltage(data: &[u8]) -> Reading {
    data.first().map_or(Reading::Missing, |&b| Reading::Value(b as f64 * 0.1))
}

fn total_distance(data: &[u8]) -> Reading {
    u32_be(data, 0).map_or(Reading::Missing, |raw| Reading::Value(raw as f64 * 0.1))
}

#[rustfmt::skip]
static SIGNALS: &[Signal<u8>] = &[
    Signal::new(PID_VEHICLE_SPEED, metrics::SPEED, raw_byte),
    Signal::new(PID_ENGINE_RPM, metrics::ENGINE_RPM, engine_rpm),
    Signal::new(PID_COOLANT_TEMP, metrics::COOLANT_TEMP, temperature),
    Signal::new(PID_OIL_PRESSURE, metrics::OIL_PRESSURE, oil_pressure),
    Signal::new(PID_ENGINE_LOAD, metrics::ENGINE_LOAD, raw_byte),
    Signal::new(PID_FUEL_LEVEL, metrics::FUEL_LEVEL, fuel_level),
    Signal::new(PID_BATTERY_VOLTAGE, metrics::BATTERY_VOLTAGE, battery_voltage),
    Signal::new(PID_AMBIENT_TEMP, metrics::AMBIENT_TEMP, temperature),
    Signal::new(PID_TOTAL_DISTANCE, metrics::TOTAL_DISTANCE, total_distance),
];

/// Parse the entries of a PID 194/195 block: faulting PID/SID, diagnostic code character and an
/// optional occurrence count.
fn parse_dtcs(mid: u8, pid: u8, data: &[u8]) -> Vec<DtcRecord> {
    let mut records = vec![];
    let mut offset = 0;

    while offset + 2 <= data.len() {
        let code = data[offset];
        let character = data[offset + 1];
        offset += 2;

        let occurrence_count = if character & DTC_OCCURRENCE_COUNT_INCLUDED != 0 {
            match data.get(offset) {
                Some(&count) => {
                    offset += 1;
                    count
                }
                None => break,
            }
        } else {
            0
        };

        let fmi = character & DTC_FMI_MASK;
        records.push(DtcRecord {
            protocol: Protocol::J1587,
            source: mid,
            code: code as u32,
            fmi,
            occurrence_count,
            active: pid == PID_ACTIVE_DTC,
            description: format!("{}: PID {}, {}", module_name(mid), code, describe_fmi(fmi)),
            timestamp: Utc::now(),
        });
    }

    if offset < data.len() {
        warn!("MID {} PID {}: partial DTC entry {}", mid, pid, hex::encode(&data[offset..]));
    }

    records
}

/// Decoder for assembled J1587 frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct J1587Decoder;

impl J1587Decoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for J1587Decoder {
    type Frame = Vec<u8>;

    fn decode(&self, frame: &Vec<u8>, metrics: &MetricTable) -> crate::Result<Vec<DtcRecord>> {
        let (mid, body) = split_frame(frame)?;
        debug!("RX MID={} {}", mid, hex::encode(body));

        let mut dtcs = vec![];
        for block in ParameterIter::new(body) {
            let (pid, data) = match block {
                Ok(block) => block,
                Err(e) => {
                    warn!("MID {}: {}, abandoning frame {}", mid, e, hex::encode(frame));
                    break;
                }
            };

            match pid {
                PID_ACTIVE_DTC | PID_PREVIOUSLY_ACTIVE_DTC => {
                    dtcs.extend(parse_dtcs(mid, pid, data))
                }
                _ => {
                    if !apply_signals(SIGNALS, pid, data, metrics) {
                        debug!("MID {}: unknown PID {} data {}", mid, pid, hex::encode(data));
                    }
                }
            }
        }

        Ok(dtcs)
    }
}
