//! Reasoning-service backends.
//!
//! The pipeline talks to the reasoning service through the [`JudgeBackend`]
//! trait: one chat-style completion per call, system prompt carrying the
//! classification schema, user prompt carrying the record. The concrete
//! service is an OpenAI-compatible `/chat/completions` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use toponym_core::{defaults, Error, Result};

/// A chat-completion backend for judge calls.
///
/// Implementations must map transient failures (transport errors, HTTP 429,
/// HTTP 5xx) to [`Error::Request`] so the classifier can retry them;
/// anything else is terminal for the call.
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    /// Run one completion and return the raw response content.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Whether an error from a backend is worth retrying.
pub fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::Request(_))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP backend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat-completions backend.
///
/// Deterministic by construction: temperature 0, no sampling knobs exposed.
pub struct HttpJudgeBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

impl HttpJudgeBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            timeout_secs: defaults::JUDGE_TIMEOUT_SECS,
        }
    }

    /// Create a backend from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `TOPONYM_JUDGE_URL` | Base URL of the service (required) |
    /// | `TOPONYM_JUDGE_MODEL` | Model slug (required) |
    /// | `TOPONYM_JUDGE_API_KEY` | Bearer token (optional) |
    /// | `TOPONYM_JUDGE_TIMEOUT_SECS` | Per-request timeout (default 30) |
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("TOPONYM_JUDGE_URL")
            .map_err(|_| Error::Config("TOPONYM_JUDGE_URL is not set".into()))?;
        let model = std::env::var("TOPONYM_JUDGE_MODEL")
            .map_err(|_| Error::Config("TOPONYM_JUDGE_MODEL is not set".into()))?;
        let mut backend = Self::new(base_url, model);
        if let Ok(key) = std::env::var("TOPONYM_JUDGE_API_KEY") {
            backend.api_key = Some(key);
        }
        if let Some(timeout) = std::env::var("TOPONYM_JUDGE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            backend.timeout_secs = timeout;
        }
        Ok(backend)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl JudgeBackend for HttpJudgeBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            stream: false,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Request(format!("judge request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 429 and 5xx are transient; everything else is a terminal
            // configuration or protocol problem.
            return if status.as_u16() == 429 || status.is_server_error() {
                warn!(status = status.as_u16(), "Transient judge error");
                Err(Error::Request(format!("judge returned {status}: {body}")))
            } else {
                Err(Error::Config(format!("judge returned {status}: {body}")))
            };
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Request(format!("failed to parse judge envelope: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Request("judge response has no choices".into()))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            response_len = content.len(),
            "Judge completion finished"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&Error::Request("timeout".into())));
        assert!(!is_retryable(&Error::Config("bad model".into())));
        assert!(!is_retryable(&Error::UngroundedEvidence("span".into())));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = HttpJudgeBackend::new("http://judge.local/v1/", "test-model");
        assert_eq!(backend.base_url, "http://judge.local/v1");
    }
}
