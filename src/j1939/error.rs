//! Error types for the J1939 protocol.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Payload Too Short For PGN 0x{0:04x}")]
    PayloadTooShort(u32),
    #[error("Payload Of {0} Bytes Exceeds A Single Frame")]
    PayloadTooLarge(usize),
}
