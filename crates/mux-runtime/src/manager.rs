//! Per-session stream manager.
//!
//! Single-flight control plane around an [`Orchestrator`]: at most one
//! active stream per session, cancellation by session+stream identity, and
//! disconnect handling. Decoupled from command invocation so cancellation
//! can execute while a stream is in progress.
//!
//! Registry mutations are atomic (entry insert-if-absent, remove-if-present)
//! so two concurrent `start`s can never both win, and a cancel racing a
//! completion never observes a half-removed entry.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use mux_core::{
    ErrorCode, ORCHESTRATOR_AGENT, SessionId, StreamEvent, StreamEventKind, StreamId,
};

use crate::orchestrate::Orchestrator;
use crate::sink::EventSink;

const BUSY_MESSAGE: &str = "A response is already in progress.";
const CANCELED_MESSAGE: &str = "Generation canceled.";
const UNHANDLED_MESSAGE: &str = "Something went wrong while generating a response.";

/// One in-flight stream. The stream id is assigned asynchronously once the
/// orchestrator's Start event is observed, so a session may briefly hold an
/// entry with an unknown id.
struct ActiveStream {
    stream_id: Mutex<Option<StreamId>>,
    cancel: CancellationToken,
    /// Lifecycle tracking only; never awaited for correctness.
    #[allow(dead_code)]
    runner: Mutex<Option<JoinHandle<()>>>,
}

/// Manages the lifecycle of active streaming responses per session.
pub struct StreamManager {
    orchestrator: Arc<dyn Orchestrator>,
    sink: Arc<dyn EventSink>,
    active: Arc<DashMap<SessionId, ActiveStream>>,
}

impl StreamManager {
    /// Create a manager routing orchestrator output to the given sink.
    #[must_use]
    pub fn new(orchestrator: Arc<dyn Orchestrator>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            orchestrator,
            sink,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Start streaming a response for a session.
    ///
    /// Fire-and-forget: failures surface as Error events on the sink, never
    /// as a call failure. If the session already has an active stream, one
    /// `Busy` notification is sent and no work is created.
    #[instrument(skip(self, message), fields(session_id = %session_id))]
    pub async fn start(&self, session_id: &SessionId, message: &str) {
        let cancel = CancellationToken::new();
        let inserted = match self.active.entry(session_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                let _ = vacant.insert(ActiveStream {
                    stream_id: Mutex::new(None),
                    cancel: cancel.clone(),
                    runner: Mutex::new(None),
                });
                true
            }
        };
        if !inserted {
            info!("start refused, session busy");
            let busy = StreamEvent::error(
                &StreamId::from(""),
                ORCHESTRATOR_AGENT,
                ErrorCode::Busy,
                BUSY_MESSAGE,
                false,
            );
            self.sink.on_event(session_id, busy).await;
            return;
        }

        let runner = tokio::spawn(run_stream(
            self.orchestrator.clone(),
            self.sink.clone(),
            self.active.clone(),
            session_id.clone(),
            message.to_owned(),
            cancel,
        ));
        if let Some(entry) = self.active.get(session_id) {
            *entry.runner.lock() = Some(runner);
        }
    }

    /// Cancel the session's active stream.
    ///
    /// Returns `true` and signals cancellation iff an entry exists and the
    /// requested id matches: an empty requested id cancels whatever is
    /// active, and an entry whose id has not been assigned yet matches any
    /// request (a client may cancel before the Start event carrying the
    /// real id has been delivered).
    pub fn cancel(&self, session_id: &SessionId, stream_id: &str) -> bool {
        if let Some(entry) = self.active.get(session_id) {
            let matches = {
                let current = entry.stream_id.lock();
                stream_id.is_empty()
                    || current.as_ref().is_none_or(|id| id.as_str() == stream_id)
            };
            if matches {
                info!(session_id = %session_id, stream_id, "cancel requested");
                entry.cancel.cancel();
                return true;
            }
        }
        debug!(session_id = %session_id, stream_id, "cancel ignored");
        false
    }

    /// Tear down the session: cancel any active stream and release
    /// session-scoped agent state. Idempotent.
    pub fn disconnect(&self, session_id: &SessionId) {
        if let Some((_, entry)) = self.active.remove(session_id) {
            entry.cancel.cancel();
            info!(session_id = %session_id, "disconnect canceled active stream");
        }
        // Uniform release, whether or not a stream was in flight.
        self.orchestrator.release_session(session_id);
    }

    /// Number of sessions with an active stream.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Drive one orchestration run, forwarding events to the sink.
#[instrument(skip_all, fields(session_id = %session_id))]
async fn run_stream(
    orchestrator: Arc<dyn Orchestrator>,
    sink: Arc<dyn EventSink>,
    active: Arc<DashMap<SessionId, ActiveStream>>,
    session_id: SessionId,
    message: String,
    cancel: CancellationToken,
) {
    let mut events = match orchestrator
        .orchestrate(&session_id, &message, cancel.clone())
        .await
    {
        Ok(events) => events,
        Err(e) => {
            error!(error = %e, "failed to launch orchestration");
            let event = StreamEvent::error(
                &StreamId::from(""),
                ORCHESTRATOR_AGENT,
                ErrorCode::Unhandled,
                UNHANDLED_MESSAGE,
                false,
            );
            sink.on_event(&session_id, event).await;
            let _ = active.remove(&session_id);
            return;
        }
    };

    let mut stream_id = StreamId::from("");
    let mut saw_terminal = false;
    while let Some(event) = events.next().await {
        if event.kind == StreamEventKind::Start {
            stream_id = event.stream_id.clone();
            // Only one writer (this run) ever assigns the id.
            if let Some(entry) = active.get(&session_id) {
                *entry.stream_id.lock() = Some(event.stream_id.clone());
            }
            info!(stream_id = %event.stream_id, "stream started");
        }
        let terminal = event.is_terminal();
        sink.on_event(&session_id, event).await;
        if terminal {
            debug!(stream_id = %stream_id, "stream reached terminal event");
            saw_terminal = true;
            let _ = active.remove(&session_id);
        }
    }

    if !saw_terminal {
        // The orchestrator closed the stream without a terminal: a canceled
        // turn, or a failure that escaped classification. Either way the
        // client must receive a terminal event to clear its indicator.
        let event = if cancel.is_cancelled() {
            info!(stream_id = %stream_id, "stream canceled");
            StreamEvent::error(
                &stream_id,
                ORCHESTRATOR_AGENT,
                ErrorCode::Canceled,
                CANCELED_MESSAGE,
                false,
            )
        } else {
            error!(stream_id = %stream_id, "stream ended without terminal event");
            StreamEvent::error(
                &stream_id,
                ORCHESTRATOR_AGENT,
                ErrorCode::Unhandled,
                UNHANDLED_MESSAGE,
                false,
            )
        };
        sink.on_event(&session_id, event).await;
    }
    let _ = active.remove(&session_id);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
