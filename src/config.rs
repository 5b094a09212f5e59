//! Tunables shared by the J1587 and J1939 pipelines.
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::j1587::constants::INTER_FRAME_GAP_MS;

/// J1708 runs at 9600 baud, 8N1
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_FRAME_BUFFER_SIZE: usize = 100;
pub const DEFAULT_DTC_BUFFER_SIZE: usize = 10;

/// Pipeline configuration. Missing fields fall back to the defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// J1708 idle time that ends a frame
    #[serde(with = "millis")]
    pub inter_frame_gap: Duration,
    /// Upper bound on how long the reader blocks before checking for shutdown
    #[serde(with = "millis")]
    pub read_timeout: Duration,
    /// Capacity of the channel between reader and processor
    pub frame_buffer_size: usize,
    /// Capacity of the channel carrying new DTCs to the consumer
    pub dtc_buffer_size: usize,
    /// Location of the DTC deduplication database. Deduplication is kept in memory if unset.
    pub store_path: Option<PathBuf>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inter_frame_gap: Duration::from_millis(INTER_FRAME_GAP_MS),
            read_timeout: DEFAULT_READ_TIMEOUT,
            frame_buffer_size: DEFAULT_FRAME_BUFFER_SIZE,
            dtc_buffer_size: DEFAULT_DTC_BUFFER_SIZE,
            store_path: None,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
