//! Speech and chat backends
//!
//! A backend owns one HTTP protocol. The orchestrator picks the backend once
//! from configuration and only ever talks to it through these traits, so
//! timeouts, cancellation, caching and history shaping stay in one place.

pub mod alltalk;
pub mod huggingface;
pub mod ollama;

use std::time::Duration;

use async_trait::async_trait;

pub use alltalk::AllTalkBackend;
pub use huggingface::HuggingFaceBackend;
pub use ollama::OllamaBackend;

use crate::config::{ChatProvider, LlmConfig};
use crate::history::NormalizedMessage;
use crate::{Error, Result};

/// One speech synthesis request with voice and language already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub language: String,
}

/// Trait for text-to-speech backends
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Synthesize speech, returning the raw audio container bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response carries no audio
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
}

/// Prompt shape sent to a chat backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatPrompt {
    /// Single prompt with system prompt and history embedded
    Flat(String),
    /// Strictly alternating user/assistant messages
    Messages(Vec<NormalizedMessage>),
}

/// One chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: ChatPrompt,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait for chat/LLM backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Whether the backend rejects consecutive messages with the same role
    fn requires_alternation(&self) -> bool {
        false
    }

    /// Check credentials and settings without touching the network
    ///
    /// # Errors
    ///
    /// Returns error if a required credential is missing
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Generate a reply
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply text is missing
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Build the chat backend selected by `config.provider`
///
/// # Errors
///
/// Returns error if the service URL is invalid or the HTTP client cannot be built
pub fn chat_backend(config: &LlmConfig) -> Result<Box<dyn ChatBackend>> {
    Ok(match config.provider {
        ChatProvider::Ollama => Box::new(OllamaBackend::new(config)?),
        ChatProvider::HuggingFace => Box::new(HuggingFaceBackend::new(config)?),
    })
}

/// Build an HTTP client carrying the per-request timeout
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Check that a configured endpoint is an absolute `http(s)` URL
pub(crate) fn endpoint_url(url: String) -> Result<String> {
    let parsed = url::Url::parse(&url)
        .map_err(|e| Error::Config(format!("invalid service url {url:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "unsupported service url scheme {:?} in {url:?}",
            parsed.scheme()
        )));
    }
    Ok(url)
}

/// Turn a non-success response into [`Error::Status`]
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Status { status, body })
}
