//! Diagnostic Trouble Codes shared by both protocols, and the store used to deduplicate them.

pub mod error;
pub mod store;

pub use store::{DtcStore, MemoryStore, SledStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, FromRepr};

/// Bus protocol a record was decoded from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[strum(to_string = "J1587")]
    J1587,
    #[strum(to_string = "J1939")]
    J1939,
}

/// Failure Mode Identifiers as defined in SAE J1939-73. J1587 uses the same meanings for 0 to 15.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum FailureMode {
    #[strum(to_string = "Data valid but above normal operational range")]
    AboveNormalMostSevere = 0,
    #[strum(to_string = "Data valid but below normal operational range")]
    BelowNormalMostSevere = 1,
    #[strum(to_string = "Data erratic, intermittent or incorrect")]
    Erratic = 2,
    #[strum(to_string = "Voltage above normal, or shorted to high source")]
    VoltageAboveNormal = 3,
    #[strum(to_string = "Voltage below normal, or shorted to low source")]
    VoltageBelowNormal = 4,
    #[strum(to_string = "Current below normal or open circuit")]
    CurrentBelowNormal = 5,
    #[strum(to_string = "Current above normal or grounded circuit")]
    CurrentAboveNormal = 6,
    #[strum(to_string = "Mechanical system not responding or out of adjustment")]
    MechanicalNotResponding = 7,
    #[strum(to_string = "Abnormal frequency or pulse width or period")]
    AbnormalFrequency = 8,
    #[strum(to_string = "Abnormal update rate")]
    AbnormalUpdateRate = 9,
    #[strum(to_string = "Abnormal rate of change")]
    AbnormalRateOfChange = 10,
    #[strum(to_string = "Root cause not known")]
    RootCauseNotKnown = 11,
    #[strum(to_string = "Bad intelligent device or component")]
    BadDevice = 12,
    #[strum(to_string = "Out of calibration")]
    OutOfCalibration = 13,
    #[strum(to_string = "Special instructions")]
    SpecialInstructions = 14,
    #[strum(to_string = "Data valid but above normal operating range, least severe level")]
    AboveNormalLeastSevere = 15,
    #[strum(to_string = "Data valid but above normal operating range, moderately severe level")]
    AboveNormalModeratelySevere = 16,
    #[strum(to_string = "Data valid but below normal operating range, least severe level")]
    BelowNormalLeastSevere = 17,
    #[strum(to_string = "Data valid but below normal operating range, moderately severe level")]
    BelowNormalModeratelySevere = 18,
    #[strum(to_string = "Received network data in error")]
    NetworkDataError = 19,
    #[strum(to_string = "Data drifted high")]
    DriftedHigh = 20,
    #[strum(to_string = "Data drifted low")]
    DriftedLow = 21,
    #[strum(to_string = "Condition exists")]
    ConditionExists = 31,
}

/// Human readable description of a failure mode identifier.
pub fn describe_fmi(fmi: u8) -> String {
    match FailureMode::from_repr(fmi) {
        Some(mode) => mode.to_string(),
        None => format!("Reserved failure mode {}", fmi),
    }
}

/// A single decoded fault. `code` is the SPN for J1939 and the faulting PID/SID for J1587.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcRecord {
    pub protocol: Protocol,
    /// MID for J1587, source address for J1939
    pub source: u8,
    pub code: u32,
    pub fmi: u8,
    /// Occurrence Count
    pub occurrence_count: u8,
    /// Active (DM1, PID 194) or previously active (DM2, PID 195)
    pub active: bool,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl DtcRecord {
    pub fn failure_mode(&self) -> Option<FailureMode> {
        FailureMode::from_repr(self.fmi)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
