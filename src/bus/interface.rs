//! Per-protocol glue between a blocking adapter and the reader thread.
use std::fmt::Debug;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::adapter::{is_idle, J1939Adapter, SerialAdapter};
use crate::j1587::constants::ModuleIdentifier;
use crate::j1587::{command, FrameAssembler};
use crate::j1939::constants::{ADDRESS_ENGINE_1, MAX_PAYLOAD_LEN};
use crate::j1939::{J1939Frame, J1939Message};
use crate::Result;

const SERIAL_READ_BUFFER_SIZE: usize = 128;

/// Owns the hardware handle. Lives on the reader thread, dropping it closes the handle.
pub trait BusInterface: Send + 'static {
    type Frame: Send + Debug + 'static;
    type Outbound: Send + Debug + 'static;

    /// Target of a clear command when the caller does not name one.
    const DEFAULT_TARGET: u8;

    /// Block for at most the adapter read timeout, appending completed frames to `frames`.
    fn poll(&mut self, frames: &mut Vec<Self::Frame>) -> Result<()>;
    fn write(&mut self, message: &Self::Outbound) -> Result<()>;

    /// Message asking `target` to clear its active DTCs.
    fn clear_dtcs_request(target: u8) -> Self::Outbound;
}

/// J1708 serial link, segmented into J1587 frames by the inter-frame gap.
pub struct SerialInterface {
    adapter: Box<dyn SerialAdapter>,
    assembler: FrameAssembler,
    buffer: [u8; SERIAL_READ_BUFFER_SIZE],
}

impl SerialInterface {
    pub fn new(adapter: impl SerialAdapter + 'static, inter_frame_gap: Duration) -> Self {
        Self {
            adapter: Box::new(adapter),
            assembler: FrameAssembler::new(inter_frame_gap),
            buffer: [0; SERIAL_READ_BUFFER_SIZE],
        }
    }
}

impl BusInterface for SerialInterface {
    type Frame = Vec<u8>;
    type Outbound = Vec<u8>;

    const DEFAULT_TARGET: u8 = ModuleIdentifier::Engine1 as u8;

    fn poll(&mut self, frames: &mut Vec<Vec<u8>>) -> Result<()> {
        let n = match self.adapter.read(&mut self.buffer) {
            Ok(n) => n,
            Err(e) if is_idle(e.kind()) => 0,
            Err(e) => return Err(e.into()),
        };

        let now = Instant::now();
        if n == 0 {
            frames.extend(self.assembler.idle(now));
        } else {
            trace!("RX {}", hex::encode(&self.buffer[..n]));
            self.assembler.extend(&self.buffer[..n], now, frames);
        }
        Ok(())
    }

    fn write(&mut self, message: &Vec<u8>) -> Result<()> {
        self.adapter.write(message)?;
        Ok(())
    }

    fn clear_dtcs_request(target: u8) -> Vec<u8> {
        command::clear_active_dtcs(target)
    }
}

/// Kernel J1939 endpoint. Frames arrive already delimited.
pub struct J1939Interface {
    adapter: Box<dyn J1939Adapter>,
}

impl J1939Interface {
    pub fn new(adapter: impl J1939Adapter + 'static) -> Self {
        Self {
            adapter: Box::new(adapter),
        }
    }
}

impl BusInterface for J1939Interface {
    type Frame = J1939Frame;
    type Outbound = J1939Message;

    const DEFAULT_TARGET: u8 = ADDRESS_ENGINE_1;

    fn poll(&mut self, frames: &mut Vec<J1939Frame>) -> Result<()> {
        frames.extend(self.adapter.recv()?);
        Ok(())
    }

    fn write(&mut self, message: &J1939Message) -> Result<()> {
        if message.data.len() > MAX_PAYLOAD_LEN {
            return Err(crate::j1939::error::Error::PayloadTooLarge(message.data.len()).into());
        }
        self.adapter.send(message.pgn, &message.data, message.destination)
    }

    fn clear_dtcs_request(target: u8) -> J1939Message {
        J1939Message::clear_active_dtcs(target)
    }
}
