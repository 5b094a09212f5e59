//! This module provides a [`SerialAdapter`] implementation for J1708 transceivers exposed as a serial port.
use std::io::{Read, Write};
use std::time::Duration;

use tokio_serial::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::adapter::SerialAdapter;
use crate::Result;

/// Adapter for a serial port opened through [`tokio_serial`].
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
}

impl SerialPortAdapter {
    /// Open `path` with a read timeout, so reads return periodically while the bus is idle.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                tokio_serial::ErrorKind::NoDevice => crate::Error::NotFound,
                _ => crate::Error::IoError(e.into()),
            })?;

        info!("Connected to {} at {} baud", path, baud_rate);
        Ok(Self { port })
    }
}

impl SerialAdapter for SerialPortAdapter {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.port.read(buf) {
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            result => result,
        }
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        debug!("TX {}", hex::encode(data));
        self.port.write_all(data)?;
        self.port.flush()
    }
}
