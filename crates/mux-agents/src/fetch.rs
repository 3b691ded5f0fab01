//! Demo agent that fetches a URL and streams a chunked snippet of the body.
//!
//! Fetch failures never fail the turn: the agent substitutes a placeholder
//! snippet instead, since its purpose is to exercise concurrent multiplexing,
//! not to be a reliable HTTP client.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mux_core::{AgentError, SessionId};

use crate::{Agent, FragmentStream};

/// Substitute body used when the fetch fails for any reason.
pub const FALLBACK_SNIPPET: &str = "Fetched placeholder content for demo concurrency.";

/// Default request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Default pause between fragments.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(55);

const CHUNK_CHARS: usize = 20;
const MAX_CHARS: usize = 180;

/// Fetches a fixed URL and yields the body in fixed-size character chunks.
///
/// Newlines are normalized to spaces and the body is capped at 180 chars,
/// so a turn stays short regardless of the page fetched.
pub struct HttpSnippetAgent {
    name: String,
    client: reqwest::Client,
    url: String,
    delay: Duration,
}

impl HttpSnippetAgent {
    /// Create a snippet agent with default timeout and delay.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, AgentError> {
        Self::with_options(name, url, DEFAULT_FETCH_TIMEOUT, DEFAULT_CHUNK_DELAY)
    }

    /// Create a snippet agent with explicit timeout and inter-fragment delay.
    pub fn with_options(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
        delay: Duration,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            client,
            url: url.into(),
            delay,
        })
    }

    async fn fetch(&self) -> Result<String, AgentError> {
        let response = self.client.get(&self.url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Agent for HttpSnippetAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _session_id: &SessionId,
        _message: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, AgentError> {
        let body = match self.fetch().await {
            Ok(body) => body,
            Err(e) => {
                debug!(agent = self.name, url = self.url, error = %e, "fetch failed, using placeholder");
                FALLBACK_SNIPPET.to_owned()
            }
        };
        let content = body.replace('\n', " ");
        let chars: Vec<char> = content.chars().take(MAX_CHARS).collect();
        let pieces: Vec<String> = chars
            .chunks(CHUNK_CHARS)
            .map(|chunk| chunk.iter().collect())
            .collect();
        let delay = self.delay;

        let fragments = stream! {
            for piece in pieces {
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
                yield Ok(piece);
            }
        };
        Ok(Box::pin(fragments))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
