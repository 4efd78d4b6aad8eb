//! Error type definitions for the playback engine
//!
//! Every failure that enters the engine is normalized into a
//! [`PlayerError`] carrying a code, a category, a severity and a
//! recoverability flag. The mapping from code to the other three is a
//! fixed table (`ErrorCode::profile`) so an error is classified exactly
//! once and every subsystem downstream agrees on its handling.

use serde::Serialize;
use thiserror::Error;

/// Broad error families used by the retry policy and recovery selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Transient network conditions worth retrying with backoff.
    NetworkTransient,
    /// Damaged or unparsable media payloads.
    SegmentCorruption,
    /// The decoder rejected otherwise-delivered media.
    DecodeFailure,
    /// The append surface or its container failed.
    MediaSourceFailure,
    /// The platform cannot play this content at all.
    FatalIncompatibility,
    /// DRM/key-system failures.
    KeySystem,
    /// Anything the classifier could not pin down.
    Unknown,
}

/// How loud an error is. `Fatal` implies `recoverable = false` and
/// short-circuits recovery to "no action".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorSeverity {
    Warning,
    Error,
    Fatal,
}

/// The full closed set of error codes the engine can produce or accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    // NetworkTransient
    NetworkTimeout,
    NetworkOffline,
    NetworkDnsFailure,
    NetworkConnectionRefused,
    NetworkHttpError,
    NetworkAborted,
    SegmentMissing,
    ManifestLoadError,
    // SegmentCorruption
    SegmentParseError,
    SegmentInvalidData,
    SegmentRangeError,
    ManifestParseError,
    // DecodeFailure
    DecodeVideoError,
    DecodeAudioError,
    DecodeMediaError,
    // MediaSourceFailure
    MseCreateError,
    SourceBufferError,
    MseAppendError,
    MseRemoveError,
    EndOfStreamError,
    MseQuotaExceeded,
    // FatalIncompatibility
    CodecNotSupported,
    MseNotSupported,
    HlsNotSupported,
    DashNotSupported,
    BrowserNotSupported,
    CorsDenied,
    ManifestInvalid,
    // KeySystem
    KeySystemError,
    KeySessionError,
    LicenseError,
    // Unknown
    PlayerLoadError,
    PlayerStateError,
    PlayerDestroyed,
    UnknownError,
}

impl ErrorCode {
    /// Fixed `code -> (category, severity, recoverable)` lookup.
    ///
    /// This is the single source of truth for classification; nothing
    /// else in the crate assigns categories or severities.
    pub fn profile(self) -> (ErrorCategory, ErrorSeverity, bool) {
        use ErrorCategory::*;
        use ErrorCode::*;
        use ErrorSeverity::*;
        match self {
            NetworkTimeout | NetworkDnsFailure | NetworkConnectionRefused | NetworkHttpError => {
                (NetworkTransient, Error, true)
            }
            NetworkOffline => (NetworkTransient, Warning, true),
            NetworkAborted => (NetworkTransient, Warning, true),
            SegmentMissing | ManifestLoadError => (NetworkTransient, Error, true),

            SegmentParseError | SegmentInvalidData | SegmentRangeError => {
                (SegmentCorruption, Error, true)
            }
            ManifestParseError => (SegmentCorruption, Error, true),

            DecodeVideoError | DecodeAudioError | DecodeMediaError => (DecodeFailure, Error, true),

            MseCreateError => (MediaSourceFailure, Fatal, false),
            SourceBufferError | MseAppendError | MseRemoveError | EndOfStreamError => {
                (MediaSourceFailure, Error, true)
            }
            MseQuotaExceeded => (MediaSourceFailure, Warning, true),

            CodecNotSupported | MseNotSupported | HlsNotSupported | DashNotSupported
            | BrowserNotSupported | CorsDenied | ManifestInvalid => {
                (FatalIncompatibility, Fatal, false)
            }

            KeySystemError | KeySessionError | LicenseError => (KeySystem, Error, true),

            PlayerLoadError => (Unknown, Error, true),
            PlayerStateError => (Unknown, Fatal, false),
            PlayerDestroyed => (Unknown, Fatal, false),
            UnknownError => (Unknown, Error, true),
        }
    }
}

/// A fully classified playback error.
///
/// Constructed through [`PlayerError::new`] or the convenience
/// constructors so the category/severity/recoverable triple always comes
/// from the code table.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{code} ({category}, {severity}): {message}")]
pub struct PlayerError {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub recoverable: bool,
    /// How many recovery attempts have been made for this error so far.
    pub retry_count: u32,
    pub message: String,
    /// Free-form diagnostic context (HTTP status, track kind, ...).
    pub context: Option<serde_json::Value>,
}

impl PlayerError {
    /// Create an error from a code; classification comes from the table.
    pub fn new<M: Into<String>>(code: ErrorCode, message: M) -> Self {
        let (category, severity, recoverable) = code.profile();
        Self {
            code,
            category,
            severity,
            recoverable,
            retry_count: 0,
            message: message.into(),
            context: None,
        }
    }

    /// Attach diagnostic context.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == ErrorSeverity::Fatal
    }

    /// Create a "player already destroyed" error.
    pub fn destroyed() -> Self {
        Self::new(
            ErrorCode::PlayerDestroyed,
            "player has been destroyed; create a new engine instance",
        )
    }

    /// Create an illegal state-transition error. These are programmer
    /// errors and therefore fatal.
    pub fn state<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorCode::PlayerStateError, message)
    }

    /// Create a load failure (missing adapter, bad source config).
    pub fn load<M: Into<String>>(message: M) -> Self {
        Self::new(ErrorCode::PlayerLoadError, message)
    }

    /// Short host-displayable description for the error's category.
    pub fn user_message(&self) -> &'static str {
        match self.category {
            ErrorCategory::NetworkTransient => {
                "Connection error. Check your network and try again."
            }
            ErrorCategory::SegmentCorruption => "The stream returned damaged data.",
            ErrorCategory::DecodeFailure => "This video could not be decoded.",
            ErrorCategory::MediaSourceFailure => "Playback was interrupted by a media error.",
            ErrorCategory::FatalIncompatibility => "This video cannot be played on this device.",
            ErrorCategory::KeySystem => "This content could not be unlocked for playback.",
            ErrorCategory::Unknown => "An unexpected playback error occurred.",
        }
    }
}
