//! Error types for the J1587 protocol.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Frame Too Short")]
    FrameTooShort,
    #[error("Invalid Checksum")]
    InvalidChecksum,
    #[error("Truncated Data For PID {0}")]
    Truncated(u8),
    #[error("Unsupported PID {0}")]
    UnsupportedPid(u8),
    #[error("Invalid Data Length For PID {0}")]
    InvalidLength(u8),
}
