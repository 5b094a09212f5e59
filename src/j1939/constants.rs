//! Constants for SAE J1939.

// Parameter Group Numbers
pub const PGN_EEC1: u32 = 0xF004;
pub const PGN_HIGH_RES_VEHICLE_DISTANCE: u32 = 0xFEC1;
pub const PGN_DM1: u32 = 0xFECA;
pub const PGN_DM2: u32 = 0xFECB;
pub const PGN_DM11: u32 = 0xFED3;
pub const PGN_ENGINE_TEMPERATURE_1: u32 = 0xFEEE;
pub const PGN_ENGINE_FLUID_LEVEL_PRESSURE_1: u32 = 0xFEEF;
pub const PGN_CRUISE_CONTROL_VEHICLE_SPEED: u32 = 0xFEF1;
pub const PGN_FUEL_ECONOMY: u32 = 0xFEF2;
pub const PGN_VEHICLE_POSITION: u32 = 0xFEF3;
pub const PGN_AMBIENT_CONDITIONS: u32 = 0xFEF5;
pub const PGN_VEHICLE_ELECTRICAL_POWER_1: u32 = 0xFEF7;
pub const PGN_DASH_DISPLAY: u32 = 0xFEFC;
pub const PGN_REQUEST: u32 = 0xEA00;

/// Largest payload of a single frame. Longer payloads need the transport protocol.
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Source address of engine #1, the default target for commands
pub const ADDRESS_ENGINE_1: u8 = 0x00;
pub const ADDRESS_GLOBAL: u8 = 0xff;

/// Lamp status bytes preceding the DTC list in DM1 and DM2
pub const DM_LAMP_STATUS_LEN: usize = 2;
pub const DM_ENTRY_LEN: usize = 4;
