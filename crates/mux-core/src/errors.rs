//! Error taxonomy for generation and streaming.
//!
//! [`AgentError`] is the failure type raised by generation agents.
//! [`ErrorCode`] is the closed set of stable wire codes attached to `Error`
//! events; classification from failure to code lives in [`crate::classify`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes suitable for telemetry and client branching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Generation was canceled; never transient.
    Canceled,
    /// Upstream HTTP/network failure; transient iff 5xx/408/429 or
    /// connection-level.
    UpstreamHttp,
    /// Per-agent failure during fan-out; scoped to one agent.
    AgentError,
    /// Session already has an active stream.
    Busy,
    /// Catch-all; never transient.
    Unhandled,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canceled => "Canceled",
            Self::UpstreamHttp => "UpstreamHttp",
            Self::AgentError => "AgentError",
            Self::Busy => "Busy",
            Self::Unhandled => "Unhandled",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures raised by an agent's generation capability.
///
/// An agent may fail at any point, including before yielding anything.
/// Cancellation is modeled as a variant so workers can distinguish a
/// cooperative stop (silent) from a real failure (one `Error` event).
#[derive(Debug, Error)]
pub enum AgentError {
    /// HTTP request failed (may or may not carry a status code).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream service returned an error status.
    #[error("upstream API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },

    /// Generation was canceled cooperatively.
    #[error("generation canceled")]
    Canceled,

    /// Agent-specific failure.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl AgentError {
    /// Construct an [`AgentError::Other`] from any displayable value.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// The upstream HTTP status, when the failure carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Api { status, .. } => Some(*status),
            Self::Canceled | Self::Other { .. } => None,
        }
    }

    /// Whether the failure is a network/transport failure.
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_wire_strings() {
        assert_eq!(ErrorCode::Canceled.as_str(), "Canceled");
        assert_eq!(ErrorCode::UpstreamHttp.as_str(), "UpstreamHttp");
        assert_eq!(ErrorCode::AgentError.as_str(), "AgentError");
        assert_eq!(ErrorCode::Busy.as_str(), "Busy");
        assert_eq!(ErrorCode::Unhandled.as_str(), "Unhandled");
    }

    #[test]
    fn error_code_serde_uses_pascal_case() {
        let json = serde_json::to_string(&ErrorCode::UpstreamHttp).unwrap();
        assert_eq!(json, "\"UpstreamHttp\"");
    }

    #[test]
    fn api_error_carries_status() {
        let err = AgentError::Api {
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.is_http());
        assert_eq!(err.to_string(), "upstream API error (503): overloaded");
    }

    #[test]
    fn canceled_has_no_status() {
        assert_eq!(AgentError::Canceled.status(), None);
        assert!(!AgentError::Canceled.is_http());
    }

    #[test]
    fn other_display() {
        let err = AgentError::other("bad prompt");
        assert_eq!(err.to_string(), "bad prompt");
        assert_eq!(err.status(), None);
    }
}
