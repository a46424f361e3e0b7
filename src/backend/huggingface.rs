//! OpenAI-compatible chat backend (Hugging Face router)
//!
//! Many hosted models reject a `system` role and repeated roles, so the
//! request always carries a strictly alternating user/assistant list.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatPrompt, ChatRequest, endpoint_url, ensure_success, http_client};
use crate::config::LlmConfig;
use crate::history::{ChatRole, NormalizedMessage};
use crate::{Error, Result};

/// Chat completions backend authenticated with a bearer token
pub struct HuggingFaceBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [NormalizedMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl HuggingFaceBackend {
    /// Create a backend from chat configuration
    ///
    /// A missing token is reported by [`ChatBackend::validate`], not here.
    ///
    /// # Errors
    ///
    /// Returns error if the service URL is invalid or the HTTP client cannot be built
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            url: endpoint_url(config.full_url())?,
            api_key: config.api_key.clone(),
        })
    }

    fn api_key(&self) -> Result<&SecretString> {
        self.api_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| Error::Config("Hugging Face API token required (set HF_TOKEN)".to_string()))
    }
}

#[async_trait]
impl ChatBackend for HuggingFaceBackend {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    fn requires_alternation(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let api_key = self.api_key()?;

        let single;
        let messages: &[NormalizedMessage] = match &request.prompt {
            ChatPrompt::Messages(messages) => messages,
            ChatPrompt::Flat(prompt) => {
                single = [NormalizedMessage {
                    role: ChatRole::User,
                    content: prompt.clone(),
                }];
                &single
            }
        };

        let body = CompletionRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            url = %self.url,
            model = %request.model,
            messages = messages.len(),
            "requesting chat completion"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let text = ensure_success(response).await?.text().await?;

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("unexpected chat body: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedResponse("no choices in response".to_string()))?;

        choice
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::MalformedResponse("no message content in response".to_string()))
    }
}
