//! Error classification
//!
//! Single entry point mapping raw causes (HTTP statuses, native media
//! errors, append-surface failures) onto the fixed [`ErrorCode`]
//! taxonomy. Classification happens exactly once, at the edge where a
//! failure enters the engine; everything inside works with the already
//! classified [`PlayerError`].

use tracing::debug;

use super::types::{ErrorCode, PlayerError};

/// A raw, unclassified failure as observed at the engine boundary.
#[derive(Debug, Clone)]
pub enum ErrorCause {
    /// An HTTP response status (0 = request never reached a server).
    HttpStatus { status: u16, url: Option<String> },
    /// A named platform/media error, e.g. `AbortError` with its message.
    Native { name: String, message: String },
    /// A failure reported by the append surface.
    Append { quota_exceeded: bool, message: String },
    /// A failure reported by a range-remove on the append surface.
    Remove { message: String },
    /// Already carries a code (adapters emit these); passed through.
    Code { code: ErrorCode, message: String },
    /// Free-form message of unknown origin; sniffed for known markers.
    Message(String),
}

/// Classify a raw cause into a [`PlayerError`].
///
/// The function never panics and never returns an unclassified error; in
/// the worst case the result is `UnknownError`.
pub fn classify(cause: ErrorCause) -> PlayerError {
    let error = match cause {
        ErrorCause::HttpStatus { status, url } => {
            let code = classify_http_status(status);
            let mut err = PlayerError::new(code, format!("HTTP status {status}"));
            err.context = Some(serde_json::json!({ "status": status, "url": url }));
            err
        }
        ErrorCause::Native { name, message } => {
            let code = classify_native(&name, &message);
            PlayerError::new(code, format!("{name}: {message}"))
        }
        ErrorCause::Append {
            quota_exceeded,
            message,
        } => {
            let code = if quota_exceeded {
                ErrorCode::MseQuotaExceeded
            } else {
                ErrorCode::MseAppendError
            };
            PlayerError::new(code, message)
        }
        ErrorCause::Remove { message } => PlayerError::new(ErrorCode::MseRemoveError, message),
        ErrorCause::Code { code, message } => PlayerError::new(code, message),
        ErrorCause::Message(message) => {
            let code = classify_message(&message).unwrap_or(ErrorCode::UnknownError);
            PlayerError::new(code, message)
        }
    };

    debug!(
        target = "player.classify",
        code = %error.code,
        category = %error.category,
        severity = %error.severity,
        recoverable = error.recoverable,
        "classified error"
    );
    error
}

/// HTTP status mapping. 401/403 are treated as CORS/authorization walls,
/// which this engine cannot recover from.
fn classify_http_status(status: u16) -> ErrorCode {
    match status {
        0 => ErrorCode::NetworkOffline,
        404 => ErrorCode::SegmentMissing,
        401 | 403 => ErrorCode::CorsDenied,
        s if s >= 500 => ErrorCode::NetworkHttpError,
        _ => ErrorCode::NetworkHttpError,
    }
}

/// Well-known platform error names, then message sniffing as fallback.
fn classify_native(name: &str, message: &str) -> ErrorCode {
    match name {
        "AbortError" => ErrorCode::NetworkAborted,
        "QuotaExceededError" => ErrorCode::MseQuotaExceeded,
        "NotSupportedError" => ErrorCode::CodecNotSupported,
        _ => classify_message(message)
            .or_else(|| classify_message(name))
            .unwrap_or(ErrorCode::UnknownError),
    }
}

/// Case-insensitive marker sniffing for free-form messages.
fn classify_message(message: &str) -> Option<ErrorCode> {
    let lower = message.to_lowercase();
    if lower.contains("codec not supported") || lower.contains("unsupported codec") {
        return Some(ErrorCode::CodecNotSupported);
    }
    if lower.contains("cors") {
        return Some(ErrorCode::CorsDenied);
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return Some(ErrorCode::NetworkTimeout);
    }
    if lower.contains("decode") {
        return Some(ErrorCode::DecodeMediaError);
    }
    if lower.contains("quota") {
        return Some(ErrorCode::MseQuotaExceeded);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCategory, ErrorSeverity};

    #[test]
    fn http_status_table() {
        assert_eq!(classify_http_status(0), ErrorCode::NetworkOffline);
        assert_eq!(classify_http_status(404), ErrorCode::SegmentMissing);
        assert_eq!(classify_http_status(401), ErrorCode::CorsDenied);
        assert_eq!(classify_http_status(403), ErrorCode::CorsDenied);
        assert_eq!(classify_http_status(500), ErrorCode::NetworkHttpError);
        assert_eq!(classify_http_status(503), ErrorCode::NetworkHttpError);
        assert_eq!(classify_http_status(418), ErrorCode::NetworkHttpError);
    }

    #[test]
    fn forbidden_status_is_fatal() {
        let err = classify(ErrorCause::HttpStatus {
            status: 403,
            url: Some("https://cdn/seg1.ts".into()),
        });
        assert_eq!(err.category, ErrorCategory::FatalIncompatibility);
        assert_eq!(err.severity, ErrorSeverity::Fatal);
        assert!(!err.recoverable);
    }

    #[test]
    fn native_names_take_priority_over_messages() {
        let code = classify_native("AbortError", "request timed out");
        assert_eq!(code, ErrorCode::NetworkAborted);
    }

    #[test]
    fn message_sniffing() {
        assert_eq!(
            classify_message("Manifest fetch timed out"),
            Some(ErrorCode::NetworkTimeout)
        );
        assert_eq!(
            classify_message("video decode pipeline error"),
            Some(ErrorCode::DecodeMediaError)
        );
        assert_eq!(
            classify_message("Codec not supported: hvc1"),
            Some(ErrorCode::CodecNotSupported)
        );
        assert_eq!(classify_message("something odd"), None);
    }

    #[test]
    fn quota_append_failures_map_to_quota_code() {
        let err = classify(ErrorCause::Append {
            quota_exceeded: true,
            message: "buffer full".into(),
        });
        assert_eq!(err.code, ErrorCode::MseQuotaExceeded);
        assert_eq!(err.category, ErrorCategory::MediaSourceFailure);
        assert!(err.recoverable);
    }

    #[test]
    fn unknown_messages_fall_through() {
        let err = classify(ErrorCause::Message("gremlins".into()));
        assert_eq!(err.code, ErrorCode::UnknownError);
        assert_eq!(err.category, ErrorCategory::Unknown);
    }
}
