//! Orchestration: turning one user turn into one logical event stream.
//!
//! Two implementations: [`SingleAgentOrchestrator`] wraps exactly one agent,
//! [`ConcurrentOrchestrator`] fans a turn out to several agents and merges
//! their outputs in arrival order.

pub mod concurrent;
pub mod single;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use mux_agents::{Agent, EchoWordsAgent, HttpSnippetAgent};
use mux_core::{SessionId, StreamEvent};

use crate::errors::RuntimeError;
use crate::settings::{MuxSettings, OrchestrationMode};

pub use concurrent::ConcurrentOrchestrator;
pub use single::SingleAgentOrchestrator;

/// Boxed stream of events for one turn (one `StreamId`).
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Executes orchestration for a user message within a session.
///
/// The returned stream is the turn's single logical event sequence: Start
/// first, then deltas/errors, then at most one terminal event. A canceled
/// turn may end without a terminal; the stream manager synthesizes the
/// `Canceled` error in that case.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Run one turn.
    async fn orchestrate(
        &self,
        session_id: &SessionId,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream, RuntimeError>;

    /// Release session-scoped agent state (called on disconnect).
    fn release_session(&self, session_id: &SessionId);
}

/// Build the demo orchestrator described by the settings.
///
/// Concurrent mode pairs the echo agent with the HTTP snippet agent;
/// single mode runs the echo agent alone.
pub fn from_settings(settings: &MuxSettings) -> Result<Arc<dyn Orchestrator>, RuntimeError> {
    let echo: Arc<dyn Agent> = Arc::new(EchoWordsAgent::with_delay(
        settings.echo.name.clone(),
        Duration::from_millis(settings.echo.word_delay_ms),
    ));
    match settings.mode {
        OrchestrationMode::Single => Ok(Arc::new(SingleAgentOrchestrator::new(echo))),
        OrchestrationMode::Concurrent => {
            let fetch = HttpSnippetAgent::with_options(
                settings.fetch.name.clone(),
                settings.fetch.url.clone(),
                Duration::from_millis(settings.fetch.timeout_ms),
                Duration::from_millis(settings.fetch.chunk_delay_ms),
            )
            .map_err(|e| RuntimeError::Launch {
                message: e.to_string(),
            })?;
            Ok(Arc::new(ConcurrentOrchestrator::new(vec![
                echo,
                Arc::new(fetch),
            ])))
        }
    }
}
