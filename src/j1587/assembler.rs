//! Splits the delimiter-free J1708 byte stream into frames using the inter-frame gap.

use std::time::{Duration, Instant};

use crate::j1587::constants::INTER_FRAME_GAP_MS;

/// Groups bytes into frames. A byte arriving at least `gap` after the previous one starts a new frame.
#[derive(Debug)]
pub struct FrameAssembler {
    gap: Duration,
    buffer: Vec<u8>,
    last: Option<Instant>,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(Duration::from_millis(INTER_FRAME_GAP_MS))
    }
}

impl FrameAssembler {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            buffer: Vec::new(),
            last: None,
        }
    }

    fn gap_elapsed(&self, now: Instant) -> bool {
        match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.gap,
            None => true,
        }
    }

    /// Append a byte received at `at`. Returns the previous frame if this byte starts a new one.
    pub fn push(&mut self, byte: u8, at: Instant) -> Option<Vec<u8>> {
        let flushed = if !self.buffer.is_empty() && self.gap_elapsed(at) {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        };

        self.buffer.push(byte);
        self.last = Some(at);
        flushed
    }

    /// Append a chunk of bytes that all arrived at `at`, collecting completed frames into `frames`.
    pub fn extend(&mut self, bytes: &[u8], at: Instant, frames: &mut Vec<Vec<u8>>) {
        frames.extend(bytes.iter().filter_map(|&byte| self.push(byte, at)));
    }

    /// Called on a read that returned no data. Flushes the buffered frame once the gap has elapsed.
    pub fn idle(&mut self, now: Instant) -> Option<Vec<u8>> {
        if !self.buffer.is_empty() && self.gap_elapsed(now) {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Number of bytes buffered for the frame in progress.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
