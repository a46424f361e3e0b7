//! TOML configuration file loading
//!
//! Supports `~/.config/tutor-voice/config.toml` (or `TUTOR_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::prompts::SystemPrompts;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TutorConfigFile {
    /// Speech synthesis backend
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Chat/LLM backend
    #[serde(default)]
    pub llm: LlmFileConfig,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Base URL (e.g. "http://127.0.0.1:7851")
    pub service_url: Option<String>,
    /// Endpoint path (e.g. "/api/tts-generate")
    pub endpoint_path: Option<String>,
    pub default_voice: Option<String>,
    pub default_language: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<f64>,
    pub enable_caching: Option<bool>,
    pub max_cache_size: Option<usize>,

    /// Request/response field names
    #[serde(default)]
    pub fields: TtsFieldsFileConfig,
}

/// Backend field names for speech requests and responses
#[derive(Debug, Default, Deserialize)]
pub struct TtsFieldsFileConfig {
    pub text: Option<String>,
    pub voice: Option<String>,
    pub language: Option<String>,
    /// Constant form fields sent with every request
    pub fixed: Option<BTreeMap<String, String>>,
    /// Response field carrying base64 audio
    pub inline_audio: Option<String>,
    /// Response fields carrying an audio location, in lookup order
    pub audio_locations: Option<Vec<String>>,
}

/// Chat/LLM configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// "ollama" or "huggingface"
    pub provider: Option<String>,
    pub service_url: Option<String>,
    pub endpoint_path: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<f64>,
    pub prompts: Option<SystemPrompts>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `TutorConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> TutorConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return TutorConfigFile::default();
    };

    if !path.exists() {
        return TutorConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                TutorConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            TutorConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/tutor-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("tutor-voice").join("config.toml"))
}
