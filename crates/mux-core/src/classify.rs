//! Failure classification into stable, transience-annotated error info.
//!
//! Total over its input domain: every [`AgentError`] maps to exactly one
//! ([`ErrorCode`], message, transience) triple, in priority order:
//!
//! 1. cancellation
//! 2. HTTP failure with a status code (5xx/408/429 transient)
//! 3. HTTP failure without a status code (connection-level, transient)
//! 4. everything else (`Unhandled`, not transient)

use crate::errors::{AgentError, ErrorCode};

/// Structured error info used to populate an `Error` event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Stable code.
    pub code: ErrorCode,
    /// User-friendly, sanitized message.
    pub message: String,
    /// Whether the caller may retry immediately.
    pub is_transient: bool,
}

impl ErrorInfo {
    fn new(code: ErrorCode, message: &str, is_transient: bool) -> Self {
        Self {
            code,
            message: message.to_owned(),
            is_transient,
        }
    }
}

/// Classify a generation failure.
#[must_use]
pub fn classify(error: &AgentError) -> ErrorInfo {
    match error {
        AgentError::Canceled => ErrorInfo::new(ErrorCode::Canceled, "Generation canceled.", false),
        e if e.is_http() => classify_http(e.status()),
        _ => ErrorInfo::new(
            ErrorCode::Unhandled,
            "Something went wrong while generating a response.",
            false,
        ),
    }
}

fn classify_http(status: Option<u16>) -> ErrorInfo {
    let Some(status) = status else {
        // Connection-level failure: no response was received at all.
        return ErrorInfo::new(
            ErrorCode::UpstreamHttp,
            "Network error talking to AI service.",
            true,
        );
    };
    let transient = status >= 500 || status == 408 || status == 429;
    let message = if transient {
        "Temporary upstream issue. Please try again."
    } else {
        "Upstream service rejected the request."
    };
    ErrorInfo::new(ErrorCode::UpstreamHttp, message, transient)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
