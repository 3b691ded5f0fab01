//! Concurrent fan-out/fan-in orchestrator.
//!
//! Runs a fixed set of agents concurrently for one user turn and multiplexes
//! their outputs onto one logical stream: one worker task per agent writes
//! into a shared unbounded queue; a single drain loop re-stamps each event
//! with the stream-wide sequence number in arrival order.
//!
//! Per-agent emission order is preserved; cross-agent interleaving follows
//! arrival and is inherently nondeterministic.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mux_agents::Agent;
use mux_core::{
    AgentError, ORCHESTRATOR_AGENT, SessionId, StreamEvent, StreamId, StreamMode,
};

use crate::errors::RuntimeError;
use crate::orchestrate::{EventStream, Orchestrator};

/// Orchestrator that fans one turn out to several agents.
pub struct ConcurrentOrchestrator {
    agents: Vec<Arc<dyn Agent>>,
}

impl ConcurrentOrchestrator {
    /// Create an orchestrator over a fixed agent roster.
    ///
    /// Agent names must be unique within the roster.
    #[must_use]
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { agents }
    }

    /// Names of the roster, in launch order.
    #[must_use]
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_owned()).collect()
    }
}

#[async_trait]
impl Orchestrator for ConcurrentOrchestrator {
    async fn orchestrate(
        &self,
        session_id: &SessionId,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<EventStream, RuntimeError> {
        let stream_id = StreamId::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();

        let mut workers = JoinSet::new();
        for agent in &self.agents {
            let _ = workers.spawn(run_worker(
                agent.clone(),
                session_id.clone(),
                message.to_owned(),
                stream_id.clone(),
                cancel.clone(),
                tx.clone(),
            ));
        }
        // The queue closes when the last worker drops its sender.
        drop(tx);

        let names = self.agent_names();
        let events = stream! {
            let mut global_seq: u64 = 0;
            yield StreamEvent::start(&stream_id, ORCHESTRATOR_AGENT, StreamMode::Concurrent)
                .with_global_seq(global_seq);
            global_seq += 1;

            let mut canceled = false;
            loop {
                let event = tokio::select! {
                    () = cancel.cancelled() => {
                        canceled = true;
                        break;
                    }
                    maybe = rx.recv() => match maybe {
                        Some(event) => event,
                        None => break,
                    },
                };
                yield event.with_global_seq(global_seq);
                global_seq += 1;
            }

            // Await full worker completion so late failures surface into
            // logs; they must not re-enter the closed queue.
            let mut counts: HashMap<String, u64> = HashMap::new();
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((name, produced)) => {
                        let _ = counts.insert(name, produced);
                    }
                    Err(e) => warn!(stream_id = %stream_id, error = %e, "agent worker panicked"),
                }
            }

            if canceled {
                debug!(stream_id = %stream_id, "turn canceled, closing without terminal");
                return;
            }

            let summary = names
                .iter()
                .filter_map(|name| {
                    counts
                        .get(name)
                        .filter(|produced| **produced > 0)
                        .map(|produced| format!("{name}:{produced}"))
                })
                .collect::<Vec<_>>()
                .join(" ");
            let final_text = if summary.is_empty() { None } else { Some(summary) };
            yield StreamEvent::end(
                &stream_id,
                ORCHESTRATOR_AGENT,
                StreamMode::Concurrent,
                global_seq - 1,
                final_text,
            )
            .with_global_seq(global_seq);
        };
        Ok(Box::pin(events))
    }

    fn release_session(&self, session_id: &SessionId) {
        for agent in &self.agents {
            agent.release_session(session_id);
        }
    }
}

/// One agent's worker: iterate its fragments into the shared queue.
///
/// Returns the agent's name and delta count for the End summary. Failures
/// are converted to a single agent-scoped Error event; cancellation stops
/// the worker silently.
async fn run_worker(
    agent: Arc<dyn Agent>,
    session_id: SessionId,
    message: String,
    stream_id: StreamId,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<StreamEvent>,
) -> (String, u64) {
    let name = agent.name().to_owned();
    let mut fragments = match agent.generate(&session_id, &message, cancel.clone()).await {
        Ok(fragments) => fragments,
        Err(AgentError::Canceled) => return (name, 0),
        Err(e) => {
            warn!(agent = name, stream_id = %stream_id, error = %e, "agent failed before producing output");
            let _ = tx.send(StreamEvent::agent_error(&stream_id, &name, e.to_string()));
            return (name, 0);
        }
    };

    let mut produced: u64 = 0;
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => break,
            item = fragments.next() => match item {
                Some(item) => item,
                None => {
                    // Normal completion: synthetic agent-end marker carrying
                    // the last assigned sequence number.
                    let _ = tx.send(StreamEvent::agent_end(
                        &stream_id,
                        &name,
                        produced.saturating_sub(1),
                    ));
                    break;
                }
            },
        };
        match item {
            Ok(fragment) if fragment.is_empty() => {}
            Ok(fragment) => {
                let _ = tx.send(StreamEvent::delta(
                    &stream_id,
                    &name,
                    fragment,
                    produced,
                    StreamMode::Concurrent,
                ));
                produced += 1;
            }
            Err(AgentError::Canceled) => break,
            Err(e) => {
                warn!(agent = name, stream_id = %stream_id, error = %e, "agent failed mid-stream");
                let _ = tx.send(StreamEvent::agent_error(&stream_id, &name, e.to_string()));
                break;
            }
        }
    }
    (name, produced)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mux_agents::{EchoWordsAgent, FragmentStream};
    use mux_core::{ErrorCode, EventStatus, StreamEventKind};

    struct ScriptedAgent {
        name: &'static str,
        fragments: Vec<&'static str>,
        fail_after: bool,
    }

    impl ScriptedAgent {
        fn ok(name: &'static str, fragments: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                fragments: fragments.to_vec(),
                fail_after: false,
            })
        }

        fn failing(name: &'static str, fragments: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                fragments: fragments.to_vec(),
                fail_after: true,
            })
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(
            &self,
            _session_id: &SessionId,
            _message: &str,
            _cancel: CancellationToken,
        ) -> Result<FragmentStream, AgentError> {
            let mut items: Vec<Result<String, AgentError>> = self
                .fragments
                .iter()
                .map(|f| Ok((*f).to_owned()))
                .collect();
            if self.fail_after {
                items.push(Err(AgentError::other("scripted failure")));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    /// Agent that produces nothing until canceled.
    struct BlockingAgent;

    #[async_trait]
    impl Agent for BlockingAgent {
        fn name(&self) -> &str {
            "Blocker"
        }

        async fn generate(
            &self,
            _session_id: &SessionId,
            _message: &str,
            cancel: CancellationToken,
        ) -> Result<FragmentStream, AgentError> {
            let fragments = stream! {
                cancel.cancelled().await;
                yield Err(AgentError::Canceled);
            };
            Ok(Box::pin(fragments))
        }
    }

    async fn run(orch: &ConcurrentOrchestrator) -> Vec<StreamEvent> {
        let sid = SessionId::from("s1");
        let stream = orch
            .orchestrate(&sid, "hello world", CancellationToken::new())
            .await
            .unwrap();
        stream.collect().await
    }

    fn agent_deltas<'a>(events: &'a [StreamEvent], agent: &str) -> Vec<&'a StreamEvent> {
        events
            .iter()
            .filter(|e| {
                e.kind == StreamEventKind::Delta
                    && e.agent == agent
                    && e.meta.status == Some(EventStatus::AgentDelta)
            })
            .collect()
    }

    #[tokio::test]
    async fn hello_world_two_agent_scenario() {
        let orch = ConcurrentOrchestrator::new(vec![
            Arc::new(EchoWordsAgent::with_delay("Echoer", Duration::ZERO)),
            ScriptedAgent::ok("Fetcher", &["chunk one ", "chunk two ", "chunk three"]),
        ]);
        let events = run(&orch).await;

        // Start first, globalSeq 0.
        assert_eq!(events[0].kind, StreamEventKind::Start);
        assert_eq!(events[0].agent, "orchestrator");
        assert_eq!(events[0].meta.global_seq, Some(0));
        assert_eq!(events[0].meta.mode, Some(StreamMode::Concurrent));

        // globalSeq strictly increasing with no gaps across the sequence.
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.meta.global_seq, Some(i as u64));
        }

        // Per-agent deltas are internally ordered: 0, 1, 2, …
        let echo = agent_deltas(&events, "Echoer");
        assert_eq!(echo.len(), 2);
        assert_eq!(echo[0].text_delta.as_deref(), Some("hello "));
        assert_eq!(echo[1].text_delta.as_deref(), Some("world "));
        for (i, event) in echo.iter().enumerate() {
            assert_eq!(event.meta.agent_seq, Some(i as u64));
        }
        let fetch = agent_deltas(&events, "Fetcher");
        assert_eq!(fetch.len(), 3);
        for (i, event) in fetch.iter().enumerate() {
            assert_eq!(event.meta.agent_seq, Some(i as u64));
        }

        // One agent-end marker per agent, empty delta, last seq.
        let ends: Vec<_> = events
            .iter()
            .filter(|e| e.meta.status == Some(EventStatus::AgentEnd))
            .collect();
        assert_eq!(ends.len(), 2);
        assert!(ends.iter().all(|e| e.text_delta.as_deref() == Some("")));
        let echo_end = ends.iter().find(|e| e.agent == "Echoer").unwrap();
        assert_eq!(echo_end.meta.agent_seq, Some(1));

        // Terminal End: tokenCount = events so far minus the Start.
        let end = events.last().unwrap();
        assert_eq!(end.kind, StreamEventKind::End);
        assert_eq!(end.agent, "orchestrator");
        assert_eq!(end.meta.status, Some(EventStatus::OrchestrationEnd));
        assert_eq!(end.meta.token_count, Some(events.len() as u64 - 2));
        let summary = end.final_text.as_deref().unwrap();
        assert!(summary.contains("Echoer:2"), "summary was {summary}");
        assert!(summary.contains("Fetcher:3"), "summary was {summary}");
    }

    #[tokio::test]
    async fn one_stream_id_for_the_whole_turn() {
        let orch = ConcurrentOrchestrator::new(vec![
            ScriptedAgent::ok("A", &["a"]),
            ScriptedAgent::ok("B", &["b"]),
        ]);
        let events = run(&orch).await;
        let id = &events[0].stream_id;
        assert!(events.iter().all(|e| &e.stream_id == id));
    }

    #[tokio::test]
    async fn agent_failure_does_not_terminate_siblings() {
        let orch = ConcurrentOrchestrator::new(vec![
            ScriptedAgent::failing("Flaky", &["partial "]),
            ScriptedAgent::ok("Steady", &["all ", "good "]),
        ]);
        let events = run(&orch).await;

        let errors: Vec<_> = events
            .iter()
            .filter(|e| e.kind == StreamEventKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        let error = errors[0];
        assert_eq!(error.agent, "Flaky");
        assert_eq!(error.error_code, Some(ErrorCode::AgentError));
        assert_eq!(error.meta.status, Some(EventStatus::AgentError));
        assert_eq!(error.error_message.as_deref(), Some("scripted failure"));
        assert!(!error.is_terminal());

        // Sibling unaffected, orchestration still ends.
        assert_eq!(agent_deltas(&events, "Steady").len(), 2);
        assert_eq!(events.last().unwrap().kind, StreamEventKind::End);

        // The failed agent produced no agent-end marker.
        assert!(
            !events
                .iter()
                .any(|e| e.agent == "Flaky" && e.meta.status == Some(EventStatus::AgentEnd))
        );
    }

    #[tokio::test]
    async fn failed_agent_is_omitted_from_summary() {
        let orch = ConcurrentOrchestrator::new(vec![
            ScriptedAgent::failing("Broken", &[]),
            ScriptedAgent::ok("Works", &["x "]),
        ]);
        let events = run(&orch).await;
        let summary = events.last().unwrap().final_text.as_deref().unwrap();
        assert_eq!(summary, "Works:1");
    }

    #[tokio::test]
    async fn empty_producer_gets_agent_end_with_seq_zero() {
        let orch = ConcurrentOrchestrator::new(vec![ScriptedAgent::ok("Quiet", &[])]);
        let events = run(&orch).await;
        let marker = events
            .iter()
            .find(|e| e.meta.status == Some(EventStatus::AgentEnd))
            .unwrap();
        assert_eq!(marker.meta.agent_seq, Some(0));
    }

    #[tokio::test]
    async fn cancellation_closes_stream_without_terminal() {
        let orch = ConcurrentOrchestrator::new(vec![
            Arc::new(BlockingAgent),
            ScriptedAgent::ok("Quick", &["q "]),
        ]);
        let sid = SessionId::from("s1");
        let cancel = CancellationToken::new();
        let mut stream = orch
            .orchestrate(&sid, "hi", cancel.clone())
            .await
            .unwrap();

        let first = stream.next().await.unwrap();
        assert_eq!(first.kind, StreamEventKind::Start);

        cancel.cancel();
        let mut rest = Vec::new();
        while let Some(event) = stream.next().await {
            rest.push(event);
        }
        assert!(
            rest.iter().all(|e| !e.is_terminal()),
            "no terminal after cancel, got {rest:?}"
        );
    }

    #[tokio::test]
    async fn release_session_reaches_every_agent() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingAgent(Arc<AtomicUsize>);

        #[async_trait]
        impl Agent for CountingAgent {
            fn name(&self) -> &str {
                "Counting"
            }
            async fn generate(
                &self,
                _session_id: &SessionId,
                _message: &str,
                _cancel: CancellationToken,
            ) -> Result<FragmentStream, AgentError> {
                Ok(Box::pin(futures::stream::empty()))
            }
            fn release_session(&self, _session_id: &SessionId) {
                let _ = self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let released = Arc::new(AtomicUsize::new(0));
        let orch = ConcurrentOrchestrator::new(vec![
            Arc::new(CountingAgent(released.clone())),
            Arc::new(CountingAgent(released.clone())),
        ]);
        orch.release_session(&SessionId::from("s1"));
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
