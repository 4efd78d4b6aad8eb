//! Adaptive playback engine
//!
//! An adaptive-bitrate video playback control plane that sits between a
//! raw media pipeline (a [`sink::VideoSink`] plus a byte-accepting
//! [`queue::AppendSurface`]) and an application surface. It orchestrates
//! the player state machine, the append/remove operation queue, the
//! buffer accountant, the ABR selector, the error/recovery controller
//! and the source-session manager so playback is smooth, adapts to
//! bandwidth, and recovers from transient failures.
//!
//! Format specifics (manifest parsing, byte fetching) live behind the
//! [`adapter::Adapter`] contract; hosts inject an
//! [`adapter::AdapterFactory`] and drive the engine through
//! [`session::PlayerEngine`].

pub mod abr;
pub mod adapter;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod player;
pub mod queue;
pub mod recovery;
pub mod retry;
pub mod session;
pub mod sink;
pub mod utils;

pub use adapter::{Adapter, AdapterEvent, AdapterFactory};
pub use config::PlayerConfig;
pub use errors::{ErrorCategory, ErrorCode, ErrorSeverity, PlayerError, PlayerResult};
pub use events::{EventBus, PlayerEvent, PlayerEventKind, Subscription};
pub use models::{
    BufferedRange, PlatformClass, PlayerSnapshot, QualityLevel, SegmentTiming, SourceConfig,
    SubtitleTrack, TrackKind,
};
pub use player::PlayerState;
pub use queue::{AppendSurface, CompletionHandle, SurfaceError};
pub use session::PlayerEngine;
pub use sink::{SinkEvent, SinkPlayError, VideoSink};
