//! Error types for the DTC deduplication store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    SledError(#[from] sled::Error),
    #[error("Store Lock Poisoned")]
    Poisoned,
}
