//! Configuration for the speech and chat backends

pub mod file;

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::prompts::SystemPrompts;
use crate::{Error, Result};

use self::file::{LlmFileConfig, TtsFieldsFileConfig, TtsFileConfig, TutorConfigFile};

/// Resolved pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Speech synthesis backend
    pub tts: TtsConfig,

    /// Chat/LLM backend
    pub llm: LlmConfig,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Base URL of the TTS service
    pub service_url: String,

    /// Endpoint path joined onto `service_url`
    pub endpoint_path: String,

    /// Voice used when the caller does not name one
    pub default_voice: String,

    /// Language used when the caller does not name one
    pub default_language: String,

    /// Wall-clock limit per request
    pub timeout: Duration,

    /// Extra attempts made by the retry wrappers
    pub max_retries: u32,

    /// Pause between retry attempts
    pub retry_delay: Duration,

    /// Cache decoded audio
    pub enable_caching: bool,

    /// Maximum number of cached buffers
    pub max_cache_size: NonZeroUsize,

    /// Backend field names
    pub fields: TtsFieldNames,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            service_url: "http://127.0.0.1:7851".to_string(),
            endpoint_path: "/api/tts-generate".to_string(),
            default_voice: "male_01.wav".to_string(),
            default_language: "en".to_string(),
            timeout: Duration::from_secs(20),
            max_retries: 2,
            retry_delay: Duration::from_secs(2),
            enable_caching: true,
            max_cache_size: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            fields: TtsFieldNames::default(),
        }
    }
}

impl TtsConfig {
    /// Full request URL (base + endpoint)
    #[must_use]
    pub fn full_url(&self) -> String {
        join_url(&self.service_url, &self.endpoint_path)
    }
}

/// Form and response field names understood by a speech backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsFieldNames {
    /// Form field carrying the text
    pub text: String,

    /// Form field carrying the voice identifier
    pub voice: String,

    /// Form field carrying the language code
    pub language: String,

    /// Constant form fields sent with every request
    pub fixed: BTreeMap<String, String>,

    /// Response field carrying base64-encoded audio
    pub inline_audio: String,

    /// Response fields carrying an audio location, in lookup order
    pub audio_locations: Vec<String>,
}

impl Default for TtsFieldNames {
    fn default() -> Self {
        let fixed = [
            ("text_filtering", "standard"),
            ("autoplay", "false"),
            ("narrator_enabled", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            text: "text_input".to_string(),
            voice: "character_voice".to_string(),
            language: "language".to_string(),
            fixed,
            inline_audio: "audio_base64".to_string(),
            audio_locations: vec!["output_file_path".to_string(), "output_file_url".to_string()],
        }
    }
}

/// Chat backend implementation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatProvider {
    /// Completion API taking one flat prompt
    #[default]
    Ollama,
    /// OpenAI-compatible chat API requiring strict role alternation
    HuggingFace,
}

impl ChatProvider {
    /// Base URL used when none is configured
    #[must_use]
    pub const fn default_service_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://127.0.0.1:11434",
            Self::HuggingFace => "https://router.huggingface.co",
        }
    }

    /// Endpoint path used when none is configured
    #[must_use]
    pub const fn default_endpoint_path(self) -> &'static str {
        match self {
            Self::Ollama => "/api/generate",
            Self::HuggingFace => "/v1/chat/completions",
        }
    }

    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3",
            Self::HuggingFace => "google/gemma-3-27b-it",
        }
    }
}

impl FromStr for ChatProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "huggingface" | "hugging_face" | "hf" => Ok(Self::HuggingFace),
            other => Err(Error::Config(format!("unknown chat provider: {other}"))),
        }
    }
}

impl fmt::Display for ChatProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ollama => "ollama",
            Self::HuggingFace => "huggingface",
        })
    }
}

/// Chat/LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Backend implementation
    pub provider: ChatProvider,

    /// Base URL of the chat service
    pub service_url: String,

    /// Endpoint path joined onto `service_url`
    pub endpoint_path: String,

    /// Model identifier
    pub model: String,

    /// Bearer token (required by `HuggingFace`)
    pub api_key: Option<SecretString>,

    /// Sampling temperature, 0.0 to 2.0
    pub temperature: f32,

    /// Maximum output tokens, 50 to 4096
    pub max_tokens: u32,

    /// Wall-clock limit per request
    pub timeout: Duration,

    /// Extra attempts made by the retry wrappers
    pub max_retries: u32,

    /// Pause between retry attempts
    pub retry_delay: Duration,

    /// System prompts per tutoring mode
    pub prompts: SystemPrompts,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::for_provider(ChatProvider::default())
    }
}

impl LlmConfig {
    /// Defaults for a given provider
    #[must_use]
    pub fn for_provider(provider: ChatProvider) -> Self {
        Self {
            provider,
            service_url: provider.default_service_url().to_string(),
            endpoint_path: provider.default_endpoint_path().to_string(),
            model: provider.default_model().to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 512,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_secs(2),
            prompts: SystemPrompts::default(),
        }
    }

    /// Full request URL (base + endpoint)
    #[must_use]
    pub fn full_url(&self) -> String {
        join_url(&self.service_url, &self.endpoint_path)
    }
}

/// Join a base URL and an endpoint path with exactly one slash
#[must_use]
pub fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Clamp a temperature into the range backends accept
#[must_use]
pub fn clamp_temperature(temperature: f32) -> f32 {
    temperature.clamp(0.0, 2.0)
}

/// Clamp a token limit into the range backends accept
#[must_use]
pub fn clamp_max_tokens(max_tokens: u32) -> u32 {
    max_tokens.clamp(50, 4096)
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// The TOML file is read from `path`, then `TUTOR_CONFIG`, then the
    /// standard config directory.
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric setting is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os("TUTOR_CONFIG").map(std::path::PathBuf::from);
        let fc = file::load_config_file(path.or(env_path.as_deref()));
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric setting is invalid
    pub fn from_sources(
        fc: TutorConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let tts = resolve_tts(fc.tts, &env)?;
        let llm = resolve_llm(fc.llm, &env)?;

        tracing::debug!(
            tts_url = %tts.full_url(),
            llm_provider = %llm.provider,
            llm_url = %llm.full_url(),
            model = %llm.model,
            caching = tts.enable_caching,
            "resolved configuration"
        );

        Ok(Self { tts, llm })
    }
}

fn resolve_tts(fc: TtsFileConfig, env: &impl Fn(&str) -> Option<String>) -> Result<TtsConfig> {
    let default = TtsConfig::default();

    let timeout_secs = parse_env(env, "TUTOR_TTS_TIMEOUT")?.or(fc.timeout_secs);
    let max_cache_size = parse_env::<usize>(env, "TUTOR_TTS_CACHE_SIZE")?
        .or(fc.max_cache_size)
        .map(|n| {
            NonZeroUsize::new(n)
                .ok_or_else(|| Error::Config("tts cache size must be positive".to_string()))
        })
        .transpose()?;

    Ok(TtsConfig {
        service_url: env("TUTOR_TTS_URL")
            .or(fc.service_url)
            .unwrap_or(default.service_url),
        endpoint_path: env("TUTOR_TTS_ENDPOINT")
            .or(fc.endpoint_path)
            .unwrap_or(default.endpoint_path),
        default_voice: env("TUTOR_TTS_VOICE")
            .or(fc.default_voice)
            .unwrap_or(default.default_voice),
        default_language: env("TUTOR_TTS_LANGUAGE")
            .or(fc.default_language)
            .unwrap_or(default.default_language),
        timeout: timeout_secs.map_or(default.timeout, Duration::from_secs),
        max_retries: fc.max_retries.unwrap_or(default.max_retries),
        retry_delay: fc
            .retry_delay_secs
            .map_or(Ok(default.retry_delay), seconds)?,
        enable_caching: env("TUTOR_TTS_CACHE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .or(fc.enable_caching)
            .unwrap_or(default.enable_caching),
        max_cache_size: max_cache_size.unwrap_or(default.max_cache_size),
        fields: resolve_fields(fc.fields, default.fields),
    })
}

fn resolve_fields(fc: TtsFieldsFileConfig, default: TtsFieldNames) -> TtsFieldNames {
    TtsFieldNames {
        text: fc.text.unwrap_or(default.text),
        voice: fc.voice.unwrap_or(default.voice),
        language: fc.language.unwrap_or(default.language),
        fixed: fc.fixed.unwrap_or(default.fixed),
        inline_audio: fc.inline_audio.unwrap_or(default.inline_audio),
        audio_locations: fc.audio_locations.unwrap_or(default.audio_locations),
    }
}

fn resolve_llm(fc: LlmFileConfig, env: &impl Fn(&str) -> Option<String>) -> Result<LlmConfig> {
    let provider = env("TUTOR_LLM_PROVIDER")
        .or(fc.provider)
        .map(|p| p.parse::<ChatProvider>())
        .transpose()?
        .unwrap_or_default();
    let default = LlmConfig::for_provider(provider);

    let temperature = parse_env(env, "TUTOR_LLM_TEMPERATURE")?
        .or(fc.temperature)
        .map_or(default.temperature, clamp_temperature);
    let max_tokens = parse_env(env, "TUTOR_LLM_MAX_TOKENS")?
        .or(fc.max_tokens)
        .map_or(default.max_tokens, clamp_max_tokens);
    let timeout_secs = parse_env(env, "TUTOR_LLM_TIMEOUT")?.or(fc.timeout_secs);

    Ok(LlmConfig {
        provider,
        service_url: env("TUTOR_LLM_URL")
            .or(fc.service_url)
            .unwrap_or(default.service_url),
        endpoint_path: env("TUTOR_LLM_ENDPOINT")
            .or(fc.endpoint_path)
            .unwrap_or(default.endpoint_path),
        model: env("TUTOR_LLM_MODEL")
            .or(fc.model)
            .unwrap_or(default.model),
        api_key: env("HF_TOKEN")
            .or(fc.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from),
        temperature,
        max_tokens,
        timeout: timeout_secs.map_or(default.timeout, Duration::from_secs),
        max_retries: fc.max_retries.unwrap_or(default.max_retries),
        retry_delay: fc
            .retry_delay_secs
            .map_or(Ok(default.retry_delay), seconds)?,
        prompts: fc.prompts.unwrap_or(default.prompts),
    })
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}")))
        })
        .transpose()
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("invalid retry delay {secs}: {e}")))
}
