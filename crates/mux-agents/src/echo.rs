//! Deterministic echo agent: streams the user's message back word by word.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mux_core::{AgentError, SessionId};

use crate::{Agent, FragmentStream};

/// Default pause between fragments, so concurrency is observable in demos.
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(40);

/// Splits the user message on whitespace and yields one fragment per word.
///
/// Each fragment carries a trailing space so concatenation reconstructs the
/// message. An empty message yields a single `"(empty) "` fragment.
pub struct EchoWordsAgent {
    name: String,
    delay: Duration,
}

impl EchoWordsAgent {
    /// Create an echo agent with the default inter-fragment delay.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_delay(name, DEFAULT_WORD_DELAY)
    }

    /// Create an echo agent with an explicit delay (zero for tests).
    #[must_use]
    pub fn with_delay(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Agent for EchoWordsAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _session_id: &SessionId,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, AgentError> {
        let mut words: Vec<String> = message
            .split_whitespace()
            .map(|w| format!("{w} "))
            .collect();
        if words.is_empty() {
            words.push("(empty) ".to_owned());
        }
        let delay = self.delay;

        let fragments = stream! {
            for word in words {
                if cancel.is_cancelled() {
                    yield Err(AgentError::Canceled);
                    return;
                }
                if !delay.is_zero() {
                    let canceled = tokio::select! {
                        () = cancel.cancelled() => true,
                        () = tokio::time::sleep(delay) => false,
                    };
                    if canceled {
                        yield Err(AgentError::Canceled);
                        return;
                    }
                }
                yield Ok(word);
            }
        };
        Ok(Box::pin(fragments))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
