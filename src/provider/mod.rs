pub mod anthropic;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider reply contained no content")]
    EmptyReply,

    #[error("API key for {0} not found in config or environment")]
    MissingKey(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Transient failures are worth retrying: rate limits, server errors,
    /// and network-level timeouts or dropped connections. Everything else
    /// (bad request, auth failure) propagates immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Token counts reported by (or estimated for) one model call. Sums
/// associatively across chunks, so dispatch order never changes the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Normalized reply from any provider: the free-form text plus usage when
/// the provider reported it.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// One contract for every model backend. The two familiar wire shapes
/// (chat-completion-style and message-API-style) are normalized behind it.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    async fn send(&self, model: &str, prompt: &str) -> Result<ModelReply, ProviderError>;
}

/// Estimate usage from text lengths when the provider did not report any,
/// using a model-family-specific characters-per-token constant.
pub fn estimate_usage(model: &str, prompt_chars: usize, reply_chars: usize) -> TokenUsage {
    let chars_per_token = if model.contains("claude") { 3.5 } else { 4.0 };
    TokenUsage {
        input_tokens: (prompt_chars as f64 / chars_per_token).ceil() as u64,
        output_tokens: (reply_chars as f64 / chars_per_token).ceil() as u64,
    }
}

/// Dispatch one prompt, retrying transient failures with a fixed delay.
/// `max_retries` counts additional attempts after the first.
pub async fn send_with_retry(
    provider: &dyn ModelProvider,
    model: &str,
    prompt: &str,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<ModelReply, ProviderError> {
    let mut remaining = max_retries;
    loop {
        match provider.send(model, prompt).await {
            Ok(reply) => return Ok(reply),
            Err(err) if err.is_transient() && remaining > 0 => {
                remaining -= 1;
                warn!(provider = provider.name(), error = %err, remaining, "transient provider error, retrying after delay");
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Canned provider for the `--mock` demo path and tests: returns a fixed
/// reply without touching the network.
pub struct MockProvider {
    reply: String,
}

impl MockProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        MockProvider {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, _model: &str, _prompt: &str) -> Result<ModelReply, ProviderError> {
        Ok(ModelReply {
            text: self.reply.clone(),
            usage: None,
        })
    }
}
