//! Shared data model types for the playback engine
//!
//! These are plain serde-derived structs passed between the engine
//! subsystems and across the host boundary. Anything with behaviour
//! lives in the subsystem modules; this module is shape only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PlayerError;
use crate::player::PlayerState;

/// A single quality variant exposed by the source adapter.
///
/// The level set is immutable for the lifetime of a source session and is
/// sorted by ascending bitrate when it is handed to the ABR controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub index: usize,
    /// Peak bitrate in bits per second.
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub codec: Option<String>,
    pub frame_rate: Option<f32>,
    pub label: String,
}

impl QualityLevel {
    /// Human-oriented label, falling back to the vertical resolution.
    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            format!("{}p", self.height)
        } else {
            self.label.clone()
        }
    }
}

/// A contiguous buffered interval in media-time seconds.
///
/// `start < end` always holds for ranges produced by this crate; range
/// sets are pairwise disjoint and sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
}

impl BufferedRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

/// One bandwidth observation derived from a segment download.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    /// Observed throughput in bits per second.
    pub bandwidth_bps: f64,
    pub timestamp: DateTime<Utc>,
}

/// Download timing for one media segment, reported by the adapter.
///
/// Samples with a non-positive `duration_ms` are discarded by the ABR
/// controller; adapters must report measured values, never synthetic ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentTiming {
    /// Transferred payload size in bytes.
    pub bytes: u64,
    /// Wall-clock download duration in milliseconds.
    pub duration_ms: u64,
    /// Media duration of the segment in seconds.
    pub segment_duration: f64,
}

impl SegmentTiming {
    /// Instantaneous throughput in bits per second, if the timing is usable.
    pub fn bandwidth_bps(&self) -> Option<f64> {
        if self.duration_ms == 0 {
            return None;
        }
        Some(self.bytes as f64 * 8.0 / (self.duration_ms as f64 / 1000.0))
    }
}

/// Media track addressed by append/remove operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Coarse host platform class used to pick buffer and ABR defaults.
///
/// Injected through configuration; the engine never sniffs user agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformClass {
    Mobile,
    #[default]
    Desktop,
}

/// A subtitle track advertised by the adapter. Rendering is a host concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub id: String,
    pub label: String,
    pub language: Option<String>,
}

/// Opaque description of a playback source handed to `load()`.
///
/// The engine forwards this to the adapter factory untouched; only the
/// URL is inspected (for log context).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    /// Optional container/protocol hint for adapter selection.
    pub format_hint: Option<String>,
}

impl SourceConfig {
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            format_hint: None,
        }
    }
}

/// Point-in-time view of the whole engine, served by `snapshot()`.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub current_time: f64,
    /// May be non-finite for live streams.
    pub duration: f64,
    pub buffered: Vec<BufferedRange>,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub is_live: bool,
    pub quality_levels: Vec<QualityLevel>,
    pub current_quality: Option<QualityLevel>,
    pub abr_enabled: bool,
    pub error: Option<PlayerError>,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    pub current_subtitle_track: Option<String>,
}
