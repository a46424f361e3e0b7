//! Tutor Voice - speech and reply pipeline for conversational language tutors
//!
//! This library provides the request side of a tutor NPC:
//! - Decoding server-returned WAV audio into playable sample buffers
//! - Caching synthesized speech
//! - Speech (TTS) and chat (LLM) requests with timeout and cancellation
//! - Shaping conversation history for chat backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Tutor UI / playback                     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              RequestOrchestrator                     │
//! │   Cache  │  WAV decode  │  History  │  Prompts      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Backends                            │
//! │   AllTalk TTS  │  Ollama  │  Hugging Face router    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod prompts;

pub use audio::{DecodeError, DecodedAudio, SampleBuffer};
pub use cache::{CacheKey, ResponseCache};
pub use config::{ChatProvider, Config, LlmConfig, TtsConfig};
pub use error::{Error, ErrorKind, Result};
pub use history::{ChatRole, ConversationLog, ConversationMessage, NormalizedMessage, Role};
pub use orchestrator::{GrammarFeedback, RequestOrchestrator};
pub use prompts::{SystemPrompts, TutorMode};
