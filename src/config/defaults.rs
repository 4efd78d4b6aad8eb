/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Buffer defaults per platform class (seconds)
pub const MOBILE_MAX_BUFFER: f64 = 20.0;
pub const MOBILE_TARGET_BUFFER: f64 = 15.0;
pub const MOBILE_MIN_BUFFER: f64 = 5.0;
pub const MOBILE_BACK_BUFFER: f64 = 20.0;

pub const DESKTOP_MAX_BUFFER: f64 = 40.0;
pub const DESKTOP_TARGET_BUFFER: f64 = 30.0;
pub const DESKTOP_MIN_BUFFER: f64 = 10.0;
pub const DESKTOP_BACK_BUFFER: f64 = 30.0;

// Clamps applied while the session is marked hidden (seconds)
pub const HIDDEN_MAX_BUFFER: f64 = 10.0;
pub const HIDDEN_TARGET_BUFFER: f64 = 8.0;

// Buffer accountant signalling
pub const BUFFER_UPDATE_THROTTLE_MS: u64 = 250;

// ABR defaults
pub const BANDWIDTH_SAMPLE_HISTORY: usize = 10;
pub const EWMA_FAST_ALPHA: f64 = 0.5;
pub const EWMA_SLOW_ALPHA: f64 = 0.1;
pub const DESKTOP_BANDWIDTH_SAFETY_FACTOR: f64 = 0.8;
pub const MOBILE_BANDWIDTH_SAFETY_FACTOR: f64 = 0.6;
pub const DESKTOP_UPGRADE_BUFFER_THRESHOLD: f64 = 10.0;
pub const MOBILE_UPGRADE_BUFFER_THRESHOLD: f64 = 15.0;
pub const DOWNGRADE_BUFFER_THRESHOLD: f64 = 5.0;
pub const ABR_WARMUP_SEGMENTS: u64 = 3;
pub const UPGRADE_MIN_BITRATE_RATIO: f64 = 1.3;
pub const UPGRADE_INTERVAL_MS: u64 = 10_000;
pub const DOWNGRADE_INTERVAL_MS: u64 = 5_000;
pub const DROPPED_FRAME_RATE_LIMIT: f64 = 10.0;
pub const FORCED_DROP_LEVELS: usize = 2;
pub const DROPPED_FRAME_SAMPLE_INTERVAL_MS: u64 = 1_000;

// Retry defaults
pub const RETRY_JITTER_FACTOR: f64 = 0.25;

// Playback defaults
pub const DEFAULT_VOLUME: f64 = 1.0;
