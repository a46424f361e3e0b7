//! AllTalk-style TTS backend
//!
//! The service takes a form POST and answers with JSON. Audio comes back
//! either inline (base64) or as a location to fetch: a local path, a
//! `file://` URL, an absolute `http(s)` URL, or a URL relative to the
//! service.

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

use super::{SpeechBackend, SpeechRequest, endpoint_url, ensure_success, http_client};
use crate::config::{TtsConfig, TtsFieldNames};
use crate::{Error, Result};

/// Form-posting speech backend
#[derive(Debug)]
pub struct AllTalkBackend {
    client: reqwest::Client,
    url: String,
    base_url: String,
    fields: TtsFieldNames,
}

impl AllTalkBackend {
    /// Create a backend from speech configuration
    ///
    /// # Errors
    ///
    /// Returns error if the service URL is invalid or the HTTP client cannot be built
    pub fn new(config: &TtsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            url: endpoint_url(config.full_url())?,
            base_url: config.service_url.clone(),
            fields: config.fields.clone(),
        })
    }

    fn form<'a>(&'a self, request: &'a SpeechRequest) -> Vec<(&'a str, &'a str)> {
        let mut form = vec![
            (self.fields.text.as_str(), request.text.as_str()),
            (self.fields.voice.as_str(), request.voice.as_str()),
            (self.fields.language.as_str(), request.language.as_str()),
        ];
        form.extend(
            self.fields
                .fixed
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        form
    }

    async fn fetch_location(&self, location: &str) -> Result<Vec<u8>> {
        match classify_location(location, &self.base_url)? {
            Location::File(path) => {
                tracing::debug!(path = %path.display(), "reading audio file");
                Ok(tokio::fs::read(&path).await?)
            }
            Location::Remote(url) => {
                tracing::debug!(url = %url, "fetching audio");
                let response = ensure_success(self.client.get(url).send().await?).await?;
                Ok(response.bytes().await?.to_vec())
            }
        }
    }
}

#[async_trait]
impl SpeechBackend for AllTalkBackend {
    fn name(&self) -> &'static str {
        "alltalk"
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        tracing::debug!(
            url = %self.url,
            voice = %request.voice,
            language = %request.language,
            chars = request.text.chars().count(),
            "requesting speech"
        );

        let response = self
            .client
            .post(&self.url)
            .form(&self.form(request))
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;
        let json: Value = serde_json::from_str(&body)?;

        match extract_payload(&json, &self.fields)? {
            Payload::Inline(bytes) => Ok(bytes),
            Payload::Locations(locations) => {
                let mut last_error = Error::EmptyResult;
                for location in locations {
                    match self.fetch_location(&location).await {
                        Ok(bytes) => return Ok(bytes),
                        Err(e) => {
                            tracing::debug!(location = %location, error = %e, "audio location failed");
                            last_error = e;
                        }
                    }
                }
                Err(last_error)
            }
        }
    }
}

/// Audio found in a backend response
#[derive(Debug, PartialEq, Eq)]
enum Payload {
    Inline(Vec<u8>),
    Locations(Vec<String>),
}

fn extract_payload(json: &Value, fields: &TtsFieldNames) -> Result<Payload> {
    let non_empty = |field: &str| {
        json.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(encoded) = non_empty(&fields.inline_audio) {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::MalformedResponse(format!("invalid inline audio: {e}")))?;
        return Ok(Payload::Inline(bytes));
    }

    let locations: Vec<String> = fields
        .audio_locations
        .iter()
        .filter_map(|field| non_empty(field))
        .map(str::to_string)
        .collect();

    if locations.is_empty() {
        return Err(Error::EmptyResult);
    }
    Ok(Payload::Locations(locations))
}

#[derive(Debug, PartialEq, Eq)]
enum Location {
    File(std::path::PathBuf),
    Remote(url::Url),
}

fn classify_location(location: &str, base_url: &str) -> Result<Location> {
    if location.starts_with("file://") {
        let url = url::Url::parse(location)
            .map_err(|e| Error::MalformedResponse(format!("invalid file url {location}: {e}")))?;
        let path = url
            .to_file_path()
            .map_err(|()| Error::MalformedResponse(format!("not a local file url: {location}")))?;
        return Ok(Location::File(path));
    }

    if location.starts_with("http://") || location.starts_with("https://") {
        let url = url::Url::parse(location)
            .map_err(|e| Error::MalformedResponse(format!("invalid audio url {location}: {e}")))?;
        return Ok(Location::Remote(url));
    }

    let path = std::path::Path::new(location);
    if path.is_absolute() && path.exists() {
        return Ok(Location::File(path.to_path_buf()));
    }

    let base = url::Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
        .map_err(|e| Error::Config(format!("invalid service url {base_url}: {e}")))?;
    let url = base
        .join(location)
        .map_err(|e| Error::MalformedResponse(format!("invalid audio location {location}: {e}")))?;
    Ok(Location::Remote(url))
}
