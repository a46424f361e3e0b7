//! Ollama-style completion backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatPrompt, ChatRequest, endpoint_url, http_client};
use crate::config::LlmConfig;
use crate::history::ChatRole;
use crate::{Error, Result};

/// Completion backend taking one flat prompt per request
#[derive(Debug)]
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

impl OllamaBackend {
    /// Create a backend from chat configuration
    ///
    /// # Errors
    ///
    /// Returns error if the service URL is invalid or the HTTP client cannot be built
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            url: endpoint_url(config.full_url())?,
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let prompt = match &request.prompt {
            ChatPrompt::Flat(prompt) => prompt.clone(),
            ChatPrompt::Messages(messages) => messages
                .iter()
                .map(|m| match m.role {
                    ChatRole::User => format!("User: {}", m.content),
                    ChatRole::Assistant => format!("Assistant: {}", m.content),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };

        let body = GenerateRequest {
            model: &request.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        tracing::debug!(
            url = %self.url,
            model = %request.model,
            prompt_chars = prompt.chars().count(),
            "requesting completion"
        );

        let response = self.client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let mut body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND {
                body.push_str(&format!(
                    " - model not found, run 'ollama pull {}'",
                    request.model
                ));
            }
            return Err(Error::Status { status, body });
        }

        let text = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("unexpected completion body: {e}")))?;

        parsed
            .response
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::MalformedResponse("empty completion".to_string()))
    }
}
