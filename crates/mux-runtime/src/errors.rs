//! Runtime-level errors.
//!
//! Agent failures are classified into `Error` events at the worker boundary
//! (`mux_core::classify`) and never surface here; this type covers failures
//! of the control plane itself.

use thiserror::Error;

use mux_core::SessionId;

/// Errors raised by the stream manager and orchestrators.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The session already has an active stream.
    #[error("session {session_id} already has an active stream")]
    Busy {
        /// Session that refused the start.
        session_id: SessionId,
    },

    /// Orchestration could not be launched at all.
    #[error("failed to launch orchestration: {message}")]
    Launch {
        /// Failure description.
        message: String,
    },
}
