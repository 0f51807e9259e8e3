// Physical constants
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const MPS_TO_KMH: f64 = 3.6;
pub const MPS_TO_MPH: f64 = 2.23694;
pub const KNOTS_TO_MPS: f64 = 0.514444;

// Estimator tuning
pub const NOISE_FLOOR_MPS: f64 = 0.2;
pub const JITTER_DISTANCE_M: f64 = 0.5; // moves this small are GPS wander, not travel
pub const DEFAULT_BUFFER_CAPACITY: usize = 5;

// Location platform
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const NMEA_MAX_LINE: usize = 120;
pub const HDOP_UERE_M: f64 = 5.0; // rough user-equivalent range error for a consumer receiver
pub const UNKNOWN_ACCURACY_M: f64 = 100.0;

#[cfg(target_os = "windows")]
pub const DEFAULT_SERIAL_PORT: &str = "COM3";
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
