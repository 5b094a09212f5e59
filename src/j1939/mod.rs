//! SAE J1939 decoding of frames received through the kernel J1939 stack.
//! ## Example:
//! ```rust
//! use hdbus::decoder::Decoder;
//! use hdbus::j1939::{J1939Decoder, J1939Frame};
//! use hdbus::metrics::{MetricTable, ENGINE_RPM};
//!
//! let metrics = MetricTable::new();
//! let frame = J1939Frame::new(0xf004, 0x00, &[0xff, 0xff, 0xff, 0x10, 0x27, 0xff, 0xff, 0xff]);
//! J1939Decoder::new().decode(&frame, &metrics).unwrap();
//! assert_eq!(metrics.get(ENGINE_RPM), Some(1250.0));
//! ```

pub mod constants;
pub mod error;
pub mod types;

pub use types::{DiagnosticEntry, J1939Frame};

use chrono::Utc;
use tracing::{debug, warn};

use crate::decoder::{apply_signals, u16_le, u32_le, Decoder, Reading, Signal};
use crate::dtc::{describe_fmi, DtcRecord, Protocol};
use crate::j1939::constants::*;
use crate::j1939::error::Error;
use crate::metrics::{self, MetricTable};

/// Outbound message handed to a [`crate::adapter::J1939Adapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J1939Message {
    pub pgn: u32,
    pub destination: u8,
    pub data: Vec<u8>,
}

impl J1939Message {
    /// Payloads are limited to a single frame, the transport protocol is not implemented.
    pub fn new(pgn: u32, destination: u8, data: &[u8]) -> Result<Self, Error> {
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(data.len()));
        }
        Ok(Self {
            pgn,
            destination,
            data: data.to_vec(),
        })
    }

    /// Request (PGN 59904) for the PGN `pgn`, sent to `destination`.
    pub fn request(pgn: u32, destination: u8) -> Self {
        Self {
            pgn: PGN_REQUEST,
            destination,
            data: pgn.to_le_bytes()[..3].to_vec(),
        }
    }

    /// Ask `destination` to clear its active DTCs by requesting DM11.
    pub fn clear_active_dtcs(destination: u8) -> Self {
        Self::request(PGN_DM11, destination)
    }
}

fn byte(data: &[u8], offset: usize, f: impl Fn(u8) -> f64) -> Reading {
    match data.get(offset) {
        Some(0xff) => Reading::NotAvailable,
        Some(&b) => Reading::Value(f(b)),
        None => Reading::Missing,
    }
}

fn word(data: &[u8], offset: usize, f: impl Fn(u16) -> f64) -> Reading {
    match u16_le(data, offset) {
        Some(0xffff) => Reading::NotAvailable,
        Some(raw) => Reading::Value(f(raw)),
        None => Reading::Missing,
    }
}

fn dword(data: &[u8], offset: usize, f: impl Fn(u32) -> f64) -> Reading {
    match u32_le(data, offset) {
        Some(0xffff_ffff) => Reading::NotAvailable,
        Some(raw) => Reading::Value(f(raw)),
        None => Reading::Missing,
    }
}

fn engine_rpm(data: &[u8]) -> Reading {
    word(data, 3, |raw| raw as f64 * 0.125)
}

fn engine_torque(data: &[u8]) -> Reading {
    byte(data, 2, |b| b as f64 - 125.0)
}

fn latitude(data: &[u8]) -> Reading {
    dword(data, 0, |raw| raw as i32 as f64 * 1e-7)
}

fn longitude(data: &[u8]) -> Reading {
    dword(data, 4, |raw| raw as i32 as f64 * 1e-7)
}

fn fuel_rate(data: &[u8]) -> Reading {
    word(data, 0, |raw| raw as f64 * 0.05)
}

fn ambient_temp(data: &[u8]) -> Reading {
    word(data, 0, |raw| raw as f64 * 0.03125 - 273.0)
}

fn coolant_temp(data: &[u8]) -> Reading {
    byte(data, 0, |b| b as f64 - 40.0)
}

fn oil_pressure(data: &[u8]) -> Reading {
    byte(data, 3, |b| b as f64 * 4.0)
}

fn fuel_level(data: &[u8]) -> Reading {
    byte(data, 1, |b| b as f64 * 0.4)
}

fn vehicle_speed(data: &[u8]) -> Reading {
    word(data, 1, |raw| raw as f64 / 256.0)
}

fn battery_voltage(data: &[u8]) -> Reading {
    word(data, 4, |raw| raw as f64 * 0.05)
}

fn total_distance(data: &[u8]) -> Reading {
    dword(data, 0, |raw| raw as f64 * 0.005)
}

#[rustfmt::skip]
static SIGNALS: &[Signal<u32>] = &[
    Signal::new(PGN_EEC1, metrics::ENGINE_RPM, engine_rpm),
    Signal::new(PGN_EEC1, metrics::ENGINE_LOAD, engine_torque),
    Signal::new(PGN_VEHICLE_POSITION, metrics::LATITUDE, latitude),
    Signal::new(PGN_VEHICLE_POSITION, metrics::LONGITUDE, longitude),
    Signal::new(PGN_FUEL_ECONOMY, metrics::FUEL_RATE, fuel_rate),
    Signal::new(PGN_AMBIENT_CONDITIONS, metrics::AMBIENT_TEMP, ambient_temp),
    Signal::new(PGN_ENGINE_TEMPERATURE_1, metrics::COOLANT_TEMP, coolant_temp),
    Signal::new(PGN_ENGINE_FLUID_LEVEL_PRESSURE_1, metrics::OIL_PRESSURE, oil_pressure),
    Signal::new(PGN_DASH_DISPLAY, metrics::FUEL_LEVEL, fuel_level),
    Signal::new(PGN_CRUISE_CONTROL_VEHICLE_SPEED, metrics::SPEED, vehicle_speed),
    Signal::new(PGN_VEHICLE_ELECTRICAL_POWER_1, metrics::BATTERY_VOLTAGE, battery_voltage),
    Signal::new(PGN_HIGH_RES_VEHICLE_DISTANCE, metrics::TOTAL_DISTANCE, total_distance),
];

fn to_record(frame: &J1939Frame, entry: &DiagnosticEntry) -> DtcRecord {
    DtcRecord {
        protocol: Protocol::J1939,
        source: frame.source_address,
        code: entry.spn,
        fmi: entry.fmi,
        occurrence_count: entry.occurrence_count,
        active: frame.pgn == PGN_DM1,
        description: format!(
            "SA 0x{:02x} SPN {}: {}",
            frame.source_address,
            entry.spn,
            describe_fmi(entry.fmi)
        ),
        timestamp: Utc::now(),
    }
}

/// Decoder for J1939 frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct J1939Decoder;

impl J1939Decoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for J1939Decoder {
    type Frame = J1939Frame;

    fn decode(&self, frame: &J1939Frame, metrics: &MetricTable) -> crate::Result<Vec<DtcRecord>> {
        debug!("RX {:?}", frame);

        match frame.pgn {
            PGN_DM1 | PGN_DM2 => {
                let entries = types::parse_diagnostic_entries(frame.pgn, &frame.data)?;
                Ok(entries.iter().map(|entry| to_record(frame, entry)).collect())
            }
            pgn => {
                if !apply_signals(SIGNALS, pgn, &frame.data, metrics) {
                    debug!("Ignoring PGN 0x{:04x} from SA 0x{:02x}", pgn, frame.source_address);
                } else if frame.data.len() > MAX_PAYLOAD_LEN {
                    warn!("PGN 0x{:04x}: {} byte payload", pgn, frame.data.len());
                }
                Ok(vec![])
            }
        }
    }
}
