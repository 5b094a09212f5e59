//! Blocking hardware adapters the bus pipeline reads from and writes to.
use std::io::ErrorKind;

use crate::j1939::J1939Frame;
use crate::Result;

/// Trait for a blocking J1708 serial link. Reads must time out so the reader can observe cancellation.
pub trait SerialAdapter: Send {
    /// Read available bytes into `buf`. A timeout is reported as `Ok(0)` or as a `TimedOut` error.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn write(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// Trait for a blocking J1939 endpoint delivering reassembled, addressed messages.
pub trait J1939Adapter: Send {
    /// Receive one message. Returns `None` if the read timed out.
    fn recv(&mut self) -> Result<Option<J1939Frame>>;
    fn send(&mut self, pgn: u32, data: &[u8], destination: u8) -> Result<()>;
}

impl<T: SerialAdapter + ?Sized> SerialAdapter for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        (**self).write(data)
    }
}

impl<T: J1939Adapter + ?Sized> J1939Adapter for Box<T> {
    fn recv(&mut self) -> Result<Option<J1939Frame>> {
        (**self).recv()
    }

    fn send(&mut self, pgn: u32, data: &[u8], destination: u8) -> Result<()> {
        (**self).send(pgn, data, destination)
    }
}

/// Read errors that only mean the line was quiet.
pub(crate) fn is_idle(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted)
}
