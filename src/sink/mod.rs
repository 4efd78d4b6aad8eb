//! Video sink contract
//!
//! The sink is the component that actually plays decoded frames (an
//! HTML media element, a platform player, a test double). The engine
//! drives it through this trait and consumes its event stream over a
//! broadcast channel; it never assumes anything about the implementation
//! behind it.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::errors::ErrorCause;
use crate::models::BufferedRange;

/// Timing/buffer/error signals emitted by the sink.
///
/// `TimeUpdate` is expected at roughly 4 Hz or better during playback;
/// the engine's own throttling keeps downstream fan-out bounded.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Playing,
    Pause,
    /// Playback stalled waiting for data.
    Waiting,
    CanPlay,
    Ended,
    TimeUpdate {
        current_time: f64,
        buffered: Vec<BufferedRange>,
    },
    DurationChange {
        duration: f64,
    },
    Seeking {
        target: f64,
    },
    Seeked {
        position: f64,
    },
    VolumeChange {
        volume: f64,
        muted: bool,
    },
    RateChange {
        rate: f64,
    },
    LoadedMetadata,
    Progress {
        buffered: Vec<BufferedRange>,
    },
    Error {
        cause: ErrorCause,
    },
}

/// Why `play()` was refused by the sink.
#[derive(Debug, Clone, Error)]
pub enum SinkPlayError {
    /// Autoplay policy refused unmuted playback.
    #[error("playback not allowed by the host platform")]
    NotAllowed,
    #[error("play request was aborted")]
    Aborted,
    #[error("play failed: {0}")]
    Other(String),
}

/// The decoded-frame player the engine drives.
#[async_trait]
pub trait VideoSink: Send + Sync {
    fn current_time(&self) -> f64;
    /// May be `f64::INFINITY` for live streams.
    fn duration(&self) -> f64;
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    /// Ordinal readiness, 0 (nothing) to 4 (enough data).
    fn ready_state(&self) -> u8;
    fn buffered(&self) -> Vec<BufferedRange>;
    fn volume(&self) -> f64;
    fn muted(&self) -> bool;
    fn playback_rate(&self) -> f64;

    /// Resolves once playback has started (or refuses).
    async fn play(&self) -> Result<(), SinkPlayError>;
    fn pause(&self);
    /// Reset the sink's pipeline after a src change.
    fn load(&self);

    fn set_current_time(&self, t: f64);
    fn set_volume(&self, volume: f64);
    fn set_muted(&self, muted: bool);
    fn set_playback_rate(&self, rate: f64);
    /// Attach/detach the media source handle. `None` detaches.
    fn set_src(&self, src: Option<String>);

    /// Event stream; each call returns an independent receiver.
    fn subscribe(&self) -> broadcast::Receiver<SinkEvent>;
}
