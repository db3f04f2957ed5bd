//! LLM transports
//!
//! Every provider turns a role-tagged conversation into an ordered stream of
//! [`StreamEvent`]s: any number of text deltas followed by one `Done` carrying
//! the provider's final text.

pub mod claude;
pub mod ollama;
pub mod openai;
mod sse;

pub use claude::ClaudeClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::state::ChatMessage;

/// Errors that can occur when talking to an LLM provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed stream event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Provider(String),

    #[error("{0} API key not configured. Press 'P' to set it up.")]
    MissingApiKey(&'static str),

    #[error("Stream ended unexpectedly: {0}")]
    Stream(String),
}

/// One event of a streamed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental fragment of model output.
    Delta(String),
    /// Terminal event with the authoritative full text.
    Done(String),
}

pub type EventStream = BoxStream<'static, Result<StreamEvent, ProviderError>>;

/// A provider that can stream a chat completion
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Send the conversation and return the provider's event stream.
    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<EventStream, ProviderError>;
}

/// Turn a non-2xx response into a provider error carrying the body.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    ProviderError::Provider(format!("{} API error {}: {}", provider, status, text))
}
