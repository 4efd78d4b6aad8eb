//! Centralized error handling for the playback engine
//!
//! This module provides the fixed error taxonomy used across all engine
//! layers and the single classification entry point that maps raw causes
//! onto it.
//!
//! # Error categories
//!
//! - **NetworkTransient**: timeouts, offline, HTTP failures: retried with backoff
//! - **SegmentCorruption**: damaged media payloads: retried once, then skipped
//! - **DecodeFailure**: decoder rejections: answered with a quality fallback
//! - **MediaSourceFailure**: append-surface failures: answered by source re-init
//! - **FatalIncompatibility**: unplayable content/platform: never retried
//! - **KeySystem**: DRM failures: answered by source re-init
//! - **Unknown**: everything else

pub mod classify;
pub mod types;

pub use classify::{ErrorCause, classify};
pub use types::{ErrorCategory, ErrorCode, ErrorSeverity, PlayerError};

/// Convenience type alias for Results using PlayerError
pub type PlayerResult<T> = Result<T, PlayerError>;
