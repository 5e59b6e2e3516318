// // physical constants
pub const MPS_TO_KMH: f64 = 3.6;

// form constants
pub const DEFAULT_CALIBRATION_LENGTH_M: f64 = 0.5;
pub const MIN_CALIBRATION_LENGTH_M: f64 = 0.01;
pub const DEFAULT_SHUTTER_S: f64 = 1.0 / 60.0;
pub const MIN_SHUTTER_S: f64 = 1e-4;

// display constants
pub const MAX_DISPLAY_WIDTH: u32 = 700; // canvas width cap in px

// configuration defaults
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_MAX_UPLOAD_MIB: u64 = 10;
