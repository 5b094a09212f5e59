//! Contains the main error type for the library.
use thiserror::Error;

/// The main error type for the library. Each module has it's own error type that is contained by this error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not Found")]
    NotFound,
    #[error("Adapter Not Supported")]
    Unsupported,
    #[error("Interface Not Open")]
    NotOpen,
    #[error("Already Running")]
    AlreadyRunning,
    #[error("Not Running")]
    NotRunning,
    #[error("Stopped")]
    Stopped,
    #[error(transparent)]
    J1587Error(#[from] crate::j1587::error::Error),
    #[error(transparent)]
    J1939Error(#[from] crate::j1939::error::Error),
    #[error(transparent)]
    StoreError(#[from] crate::dtc::error::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
