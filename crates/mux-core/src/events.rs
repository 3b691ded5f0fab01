//! Stream event types for the multiplexed output sequence.
//!
//! One user turn produces a single logical stream of [`StreamEvent`]s sharing
//! one [`StreamId`]: exactly one `Start` first, interleaved `Delta`s (tagged
//! per agent), per-agent `Error`s where an agent fails, and one terminal
//! `End` (or a classified `Error` on the single-agent path).
//!
//! The original wire protocol carried an open string-keyed `meta` map; here
//! it is the fixed [`EventMeta`] struct whose serde output produces the same
//! keys (`agent`, `agentSeq`, `globalSeq`, `status`, `mode`, `tokenCount`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ErrorCode;
use crate::ids::StreamId;

/// Reserved agent label for orchestrator-level `Start`/`End` events.
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

/// Default role attributed to generated content.
const DEFAULT_ROLE: &str = "assistant";

/// Event kind — closed set, no other values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    /// First event of a logical stream.
    Start,
    /// Incremental text fragment (or a synthetic per-agent completion marker).
    Delta,
    /// Terminal event of a successful orchestration.
    End,
    /// Failure event; terminal unless attributed to one agent of a fan-out.
    Error,
}

/// Status label carried in [`EventMeta`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventStatus {
    /// Stream opened.
    Start,
    /// Single-agent path delta.
    Delta,
    /// Orchestration-level terminal.
    OrchestrationEnd,
    /// Fan-out delta attributed to one agent.
    AgentDelta,
    /// Synthetic empty delta marking one agent's completion.
    AgentEnd,
    /// Fan-out failure scoped to one agent.
    AgentError,
    /// Stream-level failure.
    Error,
}

/// Whether the turn ran one agent or a concurrent fan-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Multiple agents multiplexed onto one stream.
    Concurrent,
    /// One agent, one stream.
    Single,
}

/// Sequencing and attribution metadata attached to every emitted event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Producing agent's display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// 0-based fragment counter scoped to one agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_seq: Option<u64>,
    /// Strictly increasing counter across the whole emitted sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_seq: Option<u64>,
    /// Status label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    /// Orchestration mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<StreamMode>,
    /// Total delta count, present on completion events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

/// The unit of the merged output sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    /// Event kind.
    pub kind: StreamEventKind,
    /// Logical stream this event belongs to.
    pub stream_id: StreamId,
    /// Producing agent's display name, or [`ORCHESTRATOR_AGENT`].
    pub agent: String,
    /// Author role for rendering.
    pub role: String,
    /// Incremental text fragment; present only on `Delta`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_delta: Option<String>,
    /// Full/aggregate text; present on some `End` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Sequencing metadata.
    pub meta: EventMeta,
    /// Stable error code; present only on `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Sanitized error message; present only on `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Retry hint; present only on `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_transient: Option<bool>,
}

impl StreamEvent {
    fn base(kind: StreamEventKind, stream_id: &StreamId, agent: &str) -> Self {
        Self {
            kind,
            stream_id: stream_id.clone(),
            agent: agent.to_owned(),
            role: DEFAULT_ROLE.to_owned(),
            text_delta: None,
            final_text: None,
            timestamp: Utc::now(),
            meta: EventMeta {
                agent: Some(agent.to_owned()),
                ..EventMeta::default()
            },
            error_code: None,
            error_message: None,
            is_transient: None,
        }
    }

    /// Opening event of a logical stream.
    #[must_use]
    pub fn start(stream_id: &StreamId, agent: &str, mode: StreamMode) -> Self {
        let mut event = Self::base(StreamEventKind::Start, stream_id, agent);
        event.meta.status = Some(EventStatus::Start);
        event.meta.mode = Some(mode);
        event
    }

    /// Text fragment attributed to one agent.
    ///
    /// `agent_seq` counts fragments for that agent, 0-based. The status label
    /// follows the path: `delta` for single-agent turns, `agent-delta` for
    /// fan-out turns.
    #[must_use]
    pub fn delta(
        stream_id: &StreamId,
        agent: &str,
        text: impl Into<String>,
        agent_seq: u64,
        mode: StreamMode,
    ) -> Self {
        let mut event = Self::base(StreamEventKind::Delta, stream_id, agent);
        event.text_delta = Some(text.into());
        event.meta.agent_seq = Some(agent_seq);
        event.meta.mode = Some(mode);
        event.meta.status = Some(match mode {
            StreamMode::Single => EventStatus::Delta,
            StreamMode::Concurrent => EventStatus::AgentDelta,
        });
        event
    }

    /// Synthetic empty delta marking one agent's normal completion.
    ///
    /// Carries the agent's last assigned sequence number so the consumer can
    /// observe per-agent completion without a dedicated event kind.
    #[must_use]
    pub fn agent_end(stream_id: &StreamId, agent: &str, last_seq: u64) -> Self {
        let mut event = Self::base(StreamEventKind::Delta, stream_id, agent);
        event.text_delta = Some(String::new());
        event.meta.agent_seq = Some(last_seq);
        event.meta.mode = Some(StreamMode::Concurrent);
        event.meta.status = Some(EventStatus::AgentEnd);
        event
    }

    /// Terminal event of a successful turn.
    #[must_use]
    pub fn end(
        stream_id: &StreamId,
        agent: &str,
        mode: StreamMode,
        token_count: u64,
        final_text: Option<String>,
    ) -> Self {
        let mut event = Self::base(StreamEventKind::End, stream_id, agent);
        event.final_text = final_text;
        event.meta.status = Some(EventStatus::OrchestrationEnd);
        event.meta.mode = Some(mode);
        event.meta.token_count = Some(token_count);
        event
    }

    /// Failure scoped to one agent of a fan-out; does not terminate the stream.
    #[must_use]
    pub fn agent_error(stream_id: &StreamId, agent: &str, message: impl Into<String>) -> Self {
        let mut event = Self::base(StreamEventKind::Error, stream_id, agent);
        event.error_code = Some(ErrorCode::AgentError);
        event.error_message = Some(message.into());
        event.meta.status = Some(EventStatus::AgentError);
        event.meta.mode = Some(StreamMode::Concurrent);
        event
    }

    /// Stream-level failure; terminal.
    #[must_use]
    pub fn error(
        stream_id: &StreamId,
        agent: &str,
        code: ErrorCode,
        message: impl Into<String>,
        is_transient: bool,
    ) -> Self {
        let mut event = Self::base(StreamEventKind::Error, stream_id, agent);
        event.error_code = Some(code);
        event.error_message = Some(message.into());
        event.is_transient = Some(is_transient);
        event.meta.status = Some(EventStatus::Error);
        event
    }

    /// Stamp the stream-wide sequence number.
    #[must_use]
    pub fn with_global_seq(mut self, seq: u64) -> Self {
        self.meta.global_seq = Some(seq);
        self
    }

    /// Whether this event closes the logical stream.
    ///
    /// `End` is always terminal. `Error` is terminal unless it is scoped to
    /// one agent of a fan-out (`agent-error`), which leaves siblings and the
    /// stream running.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self.kind {
            StreamEventKind::End => true,
            StreamEventKind::Error => self.meta.status != Some(EventStatus::AgentError),
            StreamEventKind::Start | StreamEventKind::Delta => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_event_shape() {
        let sid = StreamId::from("s1");
        let event = StreamEvent::start(&sid, ORCHESTRATOR_AGENT, StreamMode::Concurrent)
            .with_global_seq(0);
        assert_eq!(event.kind, StreamEventKind::Start);
        assert_eq!(event.agent, "orchestrator");
        assert_eq!(event.meta.status, Some(EventStatus::Start));
        assert_eq!(event.meta.global_seq, Some(0));
        assert!(!event.is_terminal());
    }

    #[test]
    fn delta_status_follows_mode() {
        let sid = StreamId::from("s1");
        let single = StreamEvent::delta(&sid, "Echoer", "hi ", 0, StreamMode::Single);
        assert_eq!(single.meta.status, Some(EventStatus::Delta));
        let fanout = StreamEvent::delta(&sid, "Echoer", "hi ", 0, StreamMode::Concurrent);
        assert_eq!(fanout.meta.status, Some(EventStatus::AgentDelta));
        assert_eq!(fanout.text_delta.as_deref(), Some("hi "));
    }

    #[test]
    fn agent_end_is_empty_delta() {
        let sid = StreamId::from("s1");
        let event = StreamEvent::agent_end(&sid, "Fetcher", 8);
        assert_eq!(event.kind, StreamEventKind::Delta);
        assert_eq!(event.text_delta.as_deref(), Some(""));
        assert_eq!(event.meta.agent_seq, Some(8));
        assert_eq!(event.meta.status, Some(EventStatus::AgentEnd));
        assert!(!event.is_terminal());
    }

    #[test]
    fn terminal_classification() {
        let sid = StreamId::from("s1");
        let end = StreamEvent::end(&sid, ORCHESTRATOR_AGENT, StreamMode::Concurrent, 4, None);
        assert!(end.is_terminal());

        let stream_error =
            StreamEvent::error(&sid, "Echoer", ErrorCode::Unhandled, "boom", false);
        assert!(stream_error.is_terminal());

        let agent_error = StreamEvent::agent_error(&sid, "Echoer", "boom");
        assert!(!agent_error.is_terminal(), "per-agent errors leave the stream open");
    }

    #[test]
    fn meta_serializes_to_wire_keys() {
        let sid = StreamId::from("s1");
        let event = StreamEvent::delta(&sid, "Echoer", "hi ", 2, StreamMode::Concurrent)
            .with_global_seq(5);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["meta"]["agent"], "Echoer");
        assert_eq!(json["meta"]["agentSeq"], 2);
        assert_eq!(json["meta"]["globalSeq"], 5);
        assert_eq!(json["meta"]["status"], "agent-delta");
        assert_eq!(json["meta"]["mode"], "concurrent");
        assert_eq!(json["kind"], "delta");
        assert_eq!(json["streamId"], "s1");
        assert_eq!(json["textDelta"], "hi ");
        assert!(json["meta"].get("tokenCount").is_none());
        assert!(json.get("errorCode").is_none());
    }

    #[test]
    fn end_serializes_token_count() {
        let sid = StreamId::from("s1");
        let event = StreamEvent::end(
            &sid,
            ORCHESTRATOR_AGENT,
            StreamMode::Concurrent,
            13,
            Some("Echoer:2 Fetcher:9".to_owned()),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["meta"]["status"], "orchestration-end");
        assert_eq!(json["meta"]["tokenCount"], 13);
        assert_eq!(json["finalText"], "Echoer:2 Fetcher:9");
    }

    #[test]
    fn error_serializes_code_and_transience() {
        let sid = StreamId::from("s1");
        let event = StreamEvent::error(
            &sid,
            "Echoer",
            ErrorCode::UpstreamHttp,
            "Temporary upstream issue. Please try again.",
            true,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["errorCode"], "UpstreamHttp");
        assert_eq!(json["isTransient"], true);
        assert_eq!(json["meta"]["status"], "error");
    }

    #[test]
    fn event_roundtrip() {
        let sid = StreamId::from("s1");
        let event = StreamEvent::end(&sid, ORCHESTRATOR_AGENT, StreamMode::Single, 3, None)
            .with_global_seq(4);
        let json = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
