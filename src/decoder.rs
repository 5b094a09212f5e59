//! Decoding capability shared by the J1587 and J1939 decoders.
//!
//! Each protocol describes its parameters as a table of [`Signal`]s keyed by PID or PGN. The table is walked by
//! [`apply_signals`], so scaling and "not available" handling are written once for both buses.

use tracing::trace;

use crate::dtc::DtcRecord;
use crate::metrics::MetricTable;
use crate::Result;

/// Outcome of decoding a single signal from a parameter's data bytes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Reading {
    Value(f64),
    /// The sender explicitly flagged the value as not available. Clears the metric.
    NotAvailable,
    /// Not enough data bytes to decode the signal. The metric is left untouched.
    Missing,
}

/// One metric carried by a parameter (J1587 PID) or parameter group (J1939 PGN).
pub struct Signal<K> {
    pub id: K,
    pub metric: &'static str,
    pub decode: fn(&[u8]) -> Reading,
}

impl<K> Signal<K> {
    pub const fn new(id: K, metric: &'static str, decode: fn(&[u8]) -> Reading) -> Self {
        Self { id, metric, decode }
    }
}

/// Decode every signal registered for `id` into the metric table.
/// Returns false if the table has no entry for `id`.
pub fn apply_signals<K: PartialEq + Copy>(
    signals: &[Signal<K>],
    id: K,
    data: &[u8],
    metrics: &MetricTable,
) -> bool {
    let mut matched = false;
    for signal in signals.iter().filter(|signal| signal.id == id) {
        matched = true;
        match (signal.decode)(data) {
            Reading::Value(value) => metrics.set(signal.metric, Some(value)),
            Reading::NotAvailable => metrics.set(signal.metric, None),
            Reading::Missing => trace!("{} missing from {}", signal.metric, hex::encode(data)),
        }
    }
    matched
}

/// Turns frames of one protocol into metric updates and DTC records.
pub trait Decoder: Send + 'static {
    type Frame: Send + std::fmt::Debug + 'static;

    /// Decode a frame, writing metrics into `metrics` and returning the DTCs it carried.
    /// Returns an error if the frame is malformed and must be discarded.
    fn decode(&self, frame: &Self::Frame, metrics: &MetricTable) -> Result<Vec<DtcRecord>>;
}

pub(crate) fn u16_le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn u32_be(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
