//! Source adapter contract
//!
//! Adapters own everything format-specific: manifest parsing, byte
//! fetching, track selection. The engine resolves one through an
//! injected [`AdapterFactory`], wires its event stream into the core,
//! and tears it down when the session ends. Adapters report segment
//! timings with measured byte counts and download durations; the ABR
//! controller trusts them.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::errors::PlayerResult;
use crate::models::{QualityLevel, SegmentTiming, SourceConfig, SubtitleTrack};
use crate::sink::VideoSink;

/// Signals emitted by an adapter during a session.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// A media segment finished downloading.
    SegmentLoaded(SegmentTiming),
    /// A failure the adapter could not absorb. Must already carry an
    /// `ErrorCode`; the classifier upgrades unknowns on entry.
    Error(crate::errors::PlayerError),
    SubtitleTracksChanged(Vec<SubtitleTrack>),
}

/// A format-specific source driver (HLS, DASH, progressive, ...).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Prepare the sink to accept media. Resolves only once the sink is
    /// ready for source bytes (or an equivalent direct src).
    async fn attach(&self, sink: Arc<dyn VideoSink>) -> PlayerResult<()>;

    /// Start loading `source`. After success, `quality_levels()` returns
    /// the canonical level set.
    async fn load(&self, source: &SourceConfig) -> PlayerResult<()>;

    fn quality_levels(&self) -> Vec<QualityLevel>;
    /// `None` re-enables the adapter's own automatic selection.
    fn set_quality_level(&self, index: Option<usize>);
    fn current_quality_level(&self) -> Option<usize>;

    fn subtitle_tracks(&self) -> Vec<SubtitleTrack>;
    fn set_subtitle_track(&self, id: Option<&str>);
    fn current_subtitle_track(&self) -> Option<String>;

    /// Event stream; each call returns an independent receiver.
    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent>;

    /// Idempotent teardown.
    async fn destroy(&self);
}

/// Injected adapter resolution. Returning `None` means "no adapter
/// handles this source" and surfaces as a load error.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, source: &SourceConfig) -> Option<Arc<dyn Adapter>>;
}
