//! This module provides a [`J1939Adapter`] implementation on top of the Linux kernel J1939 stack.
use std::io::ErrorKind;
use std::time::Duration;

use tracing::{debug, info};

use crate::adapter::{is_idle, J1939Adapter};
use crate::j1939::J1939Frame;
use crate::Result;

pub mod socket;

use socket::{J1939Socket, J1939_NO_ADDR};

/// Large enough for any message reassembled by the kernel transport protocol
const RECV_BUFFER_SIZE: usize = 2048;

/// Adapter for a [`J1939Socket`].
pub struct SocketCan {
    socket: J1939Socket,
    buffer: Vec<u8>,
}

impl SocketCan {
    pub fn new(socket: J1939Socket) -> Self {
        Self {
            socket,
            buffer: vec![0; RECV_BUFFER_SIZE],
        }
    }

    /// Open `ifname`, optionally claiming `source_address` for transmission.
    pub fn open(ifname: &str, source_address: Option<u8>, read_timeout: Duration) -> Result<Self> {
        let address = source_address.unwrap_or(J1939_NO_ADDR);
        let socket = J1939Socket::open(ifname, address).map_err(|e| match e.kind() {
            ErrorKind::NotFound => crate::Error::NotFound,
            _ if e.raw_os_error() == Some(libc::ENODEV) => crate::Error::NotFound,
            _ => crate::Error::IoError(e),
        })?;
        socket.set_read_timeout(read_timeout)?;

        info!("Connected to SocketCAN J1939 on {}", ifname);
        Ok(Self::new(socket))
    }
}

impl J1939Adapter for SocketCan {
    fn recv(&mut self) -> Result<Option<J1939Frame>> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((len, pgn, source_address)) => {
                Ok(Some(J1939Frame::new(pgn, source_address, &self.buffer[..len])))
            }
            Err(e) if is_idle(e.kind()) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn send(&mut self, pgn: u32, data: &[u8], destination: u8) -> Result<()> {
        debug!("TX PGN=0x{:05x} DA=0x{:02x} {}", pgn, destination, hex::encode(data));
        self.socket.send_to(data, pgn, destination)?;
        Ok(())
    }
}
