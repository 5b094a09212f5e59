//! Types used in the J1939 protocol.
use std::fmt;

use tracing::warn;

use crate::j1939::constants::{DM_ENTRY_LEN, DM_LAMP_STATUS_LEN};
use crate::j1939::error::Error;

/// A J1939 message as delivered by the kernel J1939 stack, already reassembled and addressed.
#[derive(Clone, PartialEq, Eq)]
pub struct J1939Frame {
    /// Parameter Group Number
    pub pgn: u32,
    pub source_address: u8,
    pub data: Vec<u8>,
}

impl J1939Frame {
    pub fn new(pgn: u32, source_address: u8, data: &[u8]) -> Self {
        Self {
            pgn,
            source_address,
            data: data.to_vec(),
        }
    }
}

impl fmt::Debug for J1939Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("J1939Frame")
            .field("pgn", &format_args!("0x{:05x}", self.pgn))
            .field("source_address", &format_args!("0x{:02x}", self.source_address))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// One 4 byte DTC entry of a DM1 or DM2 message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    /// Suspect Parameter Number, 19 bits
    pub spn: u32,
    /// Failure Mode Identifier, 5 bits
    pub fmi: u8,
    /// SPN conversion method bit
    pub conversion_method: bool,
    /// Occurrence count, 7 bits
    pub occurrence_count: u8,
}

impl DiagnosticEntry {
    /// SPN 0 with FMI 0 is sent when no DTC is active.
    pub fn is_placeholder(&self) -> bool {
        self.spn == 0 && self.fmi == 0
    }
}

impl TryFrom<&[u8]> for DiagnosticEntry {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        match data {
            [low, mid, high_fmi, cm_oc, ..] => Ok(DiagnosticEntry {
                spn: *low as u32 | (*mid as u32) << 8 | ((*high_fmi >> 5) as u32) << 16,
                fmi: high_fmi & 0x1f,
                conversion_method: cm_oc & 0x80 != 0,
                occurrence_count: cm_oc & 0x7f,
            }),
            _ => Err(Error::PayloadTooShort(0)),
        }
    }
}

/// Parse the DTC list of a DM1/DM2 payload, skipping the lamp status and any placeholder entries.
pub fn parse_diagnostic_entries(pgn: u32, data: &[u8]) -> Result<Vec<DiagnosticEntry>, Error> {
    if data.len() < DM_LAMP_STATUS_LEN {
        return Err(Error::PayloadTooShort(pgn));
    }

    let entries = &data[DM_LAMP_STATUS_LEN..];
    let remainder = entries.len() % DM_ENTRY_LEN;
    if remainder != 0 {
        warn!(
            "PGN 0x{:04x}: ignoring {} trailing bytes after DTC entries",
            pgn, remainder
        );
    }

    entries
        .chunks_exact(DM_ENTRY_LEN)
        .map(DiagnosticEntry::try_from)
        .filter(|entry| !matches!(entry, Ok(e) if e.is_placeholder()))
        .collect()
}
