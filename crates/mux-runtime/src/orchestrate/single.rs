//! Single-agent stream adapter.
//!
//! Wraps one agent's raw fragment stream into the canonical event sequence:
//! Start, one Delta per non-empty fragment, then End carrying the delta
//! count — or a classified Error terminal if the source fails mid-stream.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mux_agents::Agent;
use mux_core::{AgentError, SessionId, StreamEvent, StreamId, StreamMode, classify};

use crate::errors::RuntimeError;
use crate::orchestrate::{EventStream, Orchestrator};

/// Orchestrator for turns with exactly one producer.
pub struct SingleAgentOrchestrator {
    agent: Arc<dyn Agent>,
}

impl SingleAgentOrchestrator {
    /// Wrap one agent.
    #[must_use]
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Orchestrator for SingleAgentOrchestrator {
    async fn orchestrate(
        &self,
        session_id: &SessionId,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream, RuntimeError> {
        let stream_id = StreamId::new();
        let agent = self.agent.clone();
        let session_id = session_id.clone();
        let message = message.to_owned();

        let events = stream! {
            let name = agent.name().to_owned();
            let mut global_seq: u64 = 0;
            yield StreamEvent::start(&stream_id, &name, StreamMode::Single)
                .with_global_seq(global_seq);
            global_seq += 1;

            let mut fragments = match agent.generate(&session_id, &message, cancel).await {
                Ok(fragments) => fragments,
                Err(AgentError::Canceled) => {
                    debug!(agent = name, stream_id = %stream_id, "generation canceled before output");
                    return;
                }
                Err(e) => {
                    warn!(agent = name, stream_id = %stream_id, error = %e, "generation failed before output");
                    let info = classify(&e);
                    yield StreamEvent::error(&stream_id, &name, info.code, info.message, info.is_transient)
                        .with_global_seq(global_seq);
                    return;
                }
            };

            let mut agent_seq: u64 = 0;
            let mut full = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) if fragment.is_empty() => {}
                    Ok(fragment) => {
                        full.push_str(&fragment);
                        yield StreamEvent::delta(&stream_id, &name, fragment, agent_seq, StreamMode::Single)
                            .with_global_seq(global_seq);
                        agent_seq += 1;
                        global_seq += 1;
                    }
                    Err(AgentError::Canceled) => {
                        debug!(agent = name, stream_id = %stream_id, "generation canceled mid-stream");
                        return;
                    }
                    Err(e) => {
                        warn!(agent = name, stream_id = %stream_id, error = %e, "generation failed mid-stream");
                        let info = classify(&e);
                        yield StreamEvent::error(&stream_id, &name, info.code, info.message, info.is_transient)
                            .with_global_seq(global_seq);
                        return;
                    }
                }
            }

            let final_text = if full.is_empty() { None } else { Some(full) };
            yield StreamEvent::end(&stream_id, &name, StreamMode::Single, agent_seq, final_text)
                .with_global_seq(global_seq);
        };
        Ok(Box::pin(events))
    }

    fn release_session(&self, session_id: &SessionId) {
        self.agent.release_session(session_id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
