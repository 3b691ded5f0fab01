//! Event delivery boundary.
//!
//! The transport that carries events to a remote client is not this crate's
//! concern; [`EventSink`] is the seam. The manager calls it once per emitted
//! event, in emission order, keyed by session.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use mux_core::{SessionId, StreamEvent};

/// Destination for emitted stream events, keyed by session.
///
/// Delivery is at-most-once per emission; a sink must not block the stream
/// for long (the manager awaits each call).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event for one session.
    async fn on_event(&self, session_id: &SessionId, event: StreamEvent);
}

/// In-process sink backed by an unbounded channel.
///
/// The receiving half is handed to the embedder (or a test) to observe the
/// delivered sequence.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(SessionId, StreamEvent)>,
}

impl ChannelSink {
    /// Create a sink and the receiver observing it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SessionId, StreamEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_event(&self, session_id: &SessionId, event: StreamEvent) {
        if self.tx.send((session_id.clone(), event)).is_err() {
            warn!(session_id = %session_id, "event sink receiver dropped");
        }
    }
}
