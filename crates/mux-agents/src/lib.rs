//! # mux-agents
//!
//! The [`Agent`] capability trait and the concrete agents shipped with the
//! runtime:
//!
//! - [`EchoWordsAgent`]: deterministic word-by-word echo
//! - [`HttpSnippetAgent`]: fetches a URL and streams a chunked snippet
//! - [`ModelAgent`]: model-backed agent over a [`CompletionProvider`],
//!   owning per-session conversation history
//!
//! An agent produces a lazy, finite sequence of text fragments for a prompt.
//! Fragments are concatenation-significant: joining one agent's fragments in
//! yield order reconstructs its full response. Agents are safe to run
//! concurrently with other agent instances, and check the cancellation token
//! at each fragment boundary.

#![deny(unsafe_code)]

pub mod echo;
pub mod fetch;
pub mod model;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use mux_core::{AgentError, SessionId};

pub use echo::EchoWordsAgent;
pub use fetch::HttpSnippetAgent;
pub use model::{ChatMessage, ChatRole, CompletionProvider, ModelAgent};

/// Boxed stream of text fragments produced by one agent for one turn.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// A named text-generation capability.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Display name, unique within one orchestration run.
    fn name(&self) -> &str;

    /// Produce the fragment stream for one user message.
    ///
    /// May fail before yielding anything (the returned `Result`) or
    /// mid-stream (an `Err` item). A cancellation-induced stop surfaces as
    /// [`AgentError::Canceled`] and is handled silently by the caller.
    async fn generate(
        &self,
        session_id: &SessionId,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, AgentError>;

    /// Drop any session-scoped state (conversation history, caches).
    ///
    /// Called uniformly on disconnect for every agent; the default is a
    /// no-op for stateless agents.
    fn release_session(&self, _session_id: &SessionId) {}
}
