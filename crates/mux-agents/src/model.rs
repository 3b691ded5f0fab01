//! Model-backed agent over an opaque completion capability.
//!
//! The network client behind a model is not this crate's concern; the
//! [`CompletionProvider`] trait is the seam. [`ModelAgent`] adds what the
//! orchestrator must not own: per-session conversation history, seeded with
//! a system prompt, appended with the user turn before generation and with
//! the concatenated assistant reply after a successful one.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mux_core::{AgentError, SessionId};

use crate::{Agent, FragmentStream};

/// Author of a [`ChatMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instruction context.
    System,
    /// End-user turn.
    User,
    /// Model reply.
    Assistant,
}

/// One turn of conversation history handed to the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// System message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Opaque completion capability: history in, fragment stream out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Stream the assistant reply for the given history.
    async fn stream_completion(
        &self,
        history: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<FragmentStream, AgentError>;
}

/// Agent backed by a [`CompletionProvider`], with per-session history.
pub struct ModelAgent {
    name: String,
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    histories: Arc<DashMap<SessionId, Vec<ChatMessage>>>,
}

impl ModelAgent {
    /// Create a model agent.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            system_prompt: system_prompt.into(),
            histories: Arc::new(DashMap::new()),
        }
    }

    /// Snapshot of the session's history, if any.
    #[must_use]
    pub fn history(&self, session_id: &SessionId) -> Option<Vec<ChatMessage>> {
        self.histories.get(session_id).map(|h| h.clone())
    }
}

#[async_trait]
impl Agent for ModelAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        session_id: &SessionId,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, AgentError> {
        let history = {
            let mut entry = self
                .histories
                .entry(session_id.clone())
                .or_insert_with(|| vec![ChatMessage::system(&self.system_prompt)]);
            entry.push(ChatMessage::user(message));
            entry.clone()
        };
        debug!(
            agent = self.name,
            session_id = %session_id,
            model = self.provider.model(),
            turns = history.len(),
            "starting completion"
        );
        let mut inner = self.provider.stream_completion(&history, cancel).await?;

        let histories = self.histories.clone();
        let sid = session_id.clone();
        let fragments = stream! {
            let mut full = String::new();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(fragment) => {
                        full.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        // Failed turn: the user message stays, no assistant
                        // reply is recorded.
                        yield Err(e);
                        return;
                    }
                }
            }
            if !full.is_empty() {
                if let Some(mut history) = histories.get_mut(&sid) {
                    history.push(ChatMessage::assistant(full));
                }
            }
        };
        Ok(Box::pin(fragments))
    }

    fn release_session(&self, session_id: &SessionId) {
        if self.histories.remove(session_id).is_some() {
            debug!(agent = self.name, session_id = %session_id, "released session history");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
