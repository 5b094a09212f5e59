//! Constants for SAE J1587.
use strum_macros::{Display, FromRepr};

/// Minimum idle time between two bytes that marks a frame boundary on J1708
pub const INTER_FRAME_GAP_MS: u64 = 4;

// Parameter Identifiers
pub const PID_ENGINE_LOAD: u8 = 91;
pub const PID_FUEL_LEVEL: u8 = 96;
pub const PID_OIL_PRESSURE: u8 = 100;
pub const PID_COOLANT_TEMP: u8 = 110;
pub const PID_VEHICLE_SPEED: u8 = 84;
pub const PID_BATTERY_VOLTAGE: u8 = 168;
pub const PID_AMBIENT_TEMP: u8 = 171;
pub const PID_ENGINE_RPM: u8 = 190;
pub const PID_ACTIVE_DTC: u8 = 194;
pub const PID_PREVIOUSLY_ACTIVE_DTC: u8 = 195;
pub const PID_TOTAL_DISTANCE: u8 = 245;
/// Proprietary command parameter asking the target module to clear its active DTCs
pub const PID_CLEAR_DTCS: u8 = 250;

/// Bit 7 of the diagnostic code character: an occurrence count byte follows
pub const DTC_OCCURRENCE_COUNT_INCLUDED: u8 = 0x80;
pub const DTC_FMI_MASK: u8 = 0x0f;

/// Data length class of a PID, determined by its range.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum PidLength {
    /// PID 0-127
    Single,
    /// PID 128-191
    Double,
    /// PID 192-253, preceded by an explicit length byte
    Variable,
    /// PID 254 and 255 escape to other parameter pages
    Extended,
}

impl From<u8> for PidLength {
    fn from(pid: u8) -> PidLength {
        match pid {
            0..=127 => PidLength::Single,
            128..=191 => PidLength::Double,
            192..=253 => PidLength::Variable,
            _ => PidLength::Extended,
        }
    }
}

/// Message Identifiers for common electronic modules
#[derive(Debug, PartialEq, Copy, Clone, FromRepr, Display)]
#[repr(u8)]
pub enum ModuleIdentifier {
    #[strum(to_string = "Engine #1")]
    Engine1 = 128,
    #[strum(to_string = "Turbocharger")]
    Turbocharger = 129,
    #[strum(to_string = "Transmission #1")]
    Transmission1 = 130,
    #[strum(to_string = "Brakes, Power Unit")]
    Brakes = 136,
    #[strum(to_string = "Instrument Cluster")]
    InstrumentCluster = 140,
    #[strum(to_string = "Trip Recorder")]
    TripRecorder = 141,
    #[strum(to_string = "Vehicle Management System")]
    VehicleManagementSystem = 142,
    #[strum(to_string = "Fuel System")]
    FuelSystem = 143,
    #[strum(to_string = "Engine #2")]
    Engine2 = 175,
    #[strum(to_string = "Brakes, Antilock")]
    AntilockBrakes = 172,
}

pub fn module_name(mid: u8) -> String {
    match ModuleIdentifier::from_repr(mid) {
        Some(module) => module.to_string(),
        None => format!("MID {}", mid),
    }
}
