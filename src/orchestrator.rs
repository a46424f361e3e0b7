//! Request orchestration for speech and chat backends
//!
//! Every outbound call is raced against a wall-clock deadline. Speech calls
//! are additionally raced against a cancellation token so the UI can abort
//! the utterance it is waiting on, and their decoded audio is cached.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::audio::{self, SampleBuffer};
use crate::backend::{
    self, AllTalkBackend, ChatBackend, ChatPrompt, ChatRequest, SpeechBackend, SpeechRequest,
};
use crate::cache::{CacheKey, ResponseCache};
use crate::config::{Config, LlmConfig, TtsConfig, clamp_max_tokens, clamp_temperature};
use crate::history::{self, ConversationMessage};
use crate::prompts::{self, TutorMode};
use crate::{Error, Result};

/// Language assumed by grammar checks when the caller names none
pub const DEFAULT_TARGET_LANGUAGE: &str = "English";

/// Result of a grammar check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarFeedback {
    /// Tutor's corrections or praise
    pub reply: String,
    /// Text that was checked
    pub original_text: String,
    /// Language the learner is practising
    pub target_language: String,
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

/// Issues speech and chat requests on behalf of the tutor UI
pub struct RequestOrchestrator {
    speech: Box<dyn SpeechBackend>,
    chat: Box<dyn ChatBackend>,
    tts: TtsConfig,
    llm: LlmConfig,
    cache: Mutex<ResponseCache>,
    in_flight: Mutex<Option<InFlight>>,
    next_request: AtomicU64,
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("tts", &self.tts)
            .field("llm", &self.llm)
            .finish_non_exhaustive()
    }
}

impl RequestOrchestrator {
    /// Create an orchestrator around explicit backends
    #[must_use]
    pub fn new(
        speech: Box<dyn SpeechBackend>,
        chat: Box<dyn ChatBackend>,
        tts: TtsConfig,
        llm: LlmConfig,
    ) -> Self {
        let cache = ResponseCache::new(tts.max_cache_size);
        Self {
            speech,
            chat,
            tts,
            llm,
            cache: Mutex::new(cache),
            in_flight: Mutex::new(None),
            next_request: AtomicU64::new(0),
        }
    }

    /// Create an orchestrator with the backends named by `config`
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let speech = Box::new(AllTalkBackend::new(&config.tts)?);
        let chat = backend::chat_backend(&config.llm)?;

        tracing::info!(
            speech = speech.name(),
            chat = chat.name(),
            "orchestrator ready"
        );

        Ok(Self::new(speech, chat, config.tts.clone(), config.llm.clone()))
    }

    /// Speech configuration in use
    #[must_use]
    pub const fn tts_config(&self) -> &TtsConfig {
        &self.tts
    }

    /// Chat configuration in use
    #[must_use]
    pub const fn llm_config(&self) -> &LlmConfig {
        &self.llm
    }

    /// Synthesize `text` into playable audio
    ///
    /// `None` (or blank) voice and language fall back to the configured
    /// defaults. Repeated requests are served from the cache when caching is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns error if the text is empty, the backend fails or times out,
    /// the call is cancelled, or the returned audio cannot be decoded
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        language: Option<&str>,
    ) -> Result<SampleBuffer> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput("text"));
        }

        let voice = non_blank(voice).unwrap_or(&self.tts.default_voice);
        let language = non_blank(language).unwrap_or(&self.tts.default_language);
        let key = CacheKey::new(text, voice, language);

        let cached = if self.tts.enable_caching {
            lock(&self.cache).get(&key)
        } else {
            None
        };
        if let Some(buffer) = cached {
            tracing::debug!(key = %key, "speech cache hit");
            return Ok(buffer);
        }

        let request = SpeechRequest {
            text: text.to_string(),
            voice: voice.to_string(),
            language: language.to_string(),
        };

        let (id, token) = self.track();
        let outcome = guarded(self.speech.synthesize(&request), &token, self.tts.timeout).await;
        self.untrack(id);

        let bytes = outcome.inspect_err(|e| {
            tracing::warn!(backend = self.speech.name(), error = %e, "speech request failed");
        })?;

        let decoded = audio::decode_wav(&bytes)?;
        if decoded.is_truncated() {
            tracing::debug!(
                dropped_bytes = decoded.dropped_bytes,
                "speech audio truncated to whole samples"
            );
        }

        let buffer = decoded.buffer;
        tracing::debug!(
            key = %key,
            channels = buffer.channels(),
            sample_rate = buffer.sample_rate(),
            frames = buffer.frames(),
            "speech synthesized"
        );

        if self.tts.enable_caching {
            lock(&self.cache).put(key, buffer.clone());
        }

        Ok(buffer)
    }

    /// Abort the in-flight synthesis, if any
    ///
    /// The aborted call resolves with [`Error::Cancelled`].
    pub fn cancel_synthesis(&self) {
        if let Some(in_flight) = lock(&self.in_flight).take() {
            tracing::debug!(request = in_flight.id, "cancelling synthesis");
            in_flight.token.cancel();
        }
    }

    /// Whether a synthesis call is currently tracked as in flight
    #[must_use]
    pub fn is_synthesizing(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// [`Self::synthesize`] with retries for transient transport failures
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-retryable error
    pub async fn synthesize_with_retry(
        &self,
        text: &str,
        voice: Option<&str>,
        language: Option<&str>,
    ) -> Result<SampleBuffer> {
        retry(self.tts.max_retries, self.tts.retry_delay, move || {
            self.synthesize(text, voice, language)
        })
        .await
    }

    /// Reply to `prompt` using the general tutoring system prompt
    ///
    /// # Errors
    ///
    /// Returns error if the prompt is empty, a credential is missing, or the
    /// backend fails, times out or returns no text
    pub async fn reply(&self, prompt: &str, history: &[ConversationMessage]) -> Result<String> {
        self.reply_in_mode(prompt, TutorMode::General, history).await
    }

    /// Reply to `prompt` using the system prompt of `mode`
    ///
    /// # Errors
    ///
    /// Same as [`Self::reply`]
    pub async fn reply_in_mode(
        &self,
        prompt: &str,
        mode: TutorMode,
        history: &[ConversationMessage],
    ) -> Result<String> {
        let system = mode.system_prompt(&self.llm.prompts);
        self.reply_with_system(prompt, Some(system), history).await
    }

    /// Reply to `prompt` with an explicit system prompt
    ///
    /// History is read, never modified.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reply`]
    pub async fn reply_with_system(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[ConversationMessage],
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::EmptyInput("prompt"));
        }

        self.chat.validate()?;

        let chat_prompt = if self.chat.requires_alternation() {
            ChatPrompt::Messages(history::normalize(prompt, system_prompt, history))
        } else {
            ChatPrompt::Flat(history::flat_prompt(prompt, system_prompt, history))
        };

        let request = ChatRequest {
            model: self.llm.model.clone(),
            prompt: chat_prompt,
            temperature: clamp_temperature(self.llm.temperature),
            max_tokens: clamp_max_tokens(self.llm.max_tokens),
        };

        tracing::debug!(
            backend = self.chat.name(),
            model = %request.model,
            history = history.len(),
            "requesting reply"
        );

        let timeout = self.llm.timeout;
        let reply = tokio::time::timeout(timeout, self.chat.complete(&request))
            .await
            .map_err(|_| Error::Timeout(timeout))
            .and_then(|result| result.map_err(|e| deadline_error(e, timeout)))
            .inspect_err(|e| {
                tracing::warn!(backend = self.chat.name(), error = %e, "chat request failed");
            })?;

        tracing::debug!(chars = reply.chars().count(), "reply received");
        Ok(reply)
    }

    /// [`Self::reply_with_system`] with retries for transient transport failures
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-retryable error
    pub async fn reply_with_retry(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[ConversationMessage],
    ) -> Result<String> {
        retry(self.llm.max_retries, self.llm.retry_delay, move || {
            self.reply_with_system(prompt, system_prompt, history)
        })
        .await
    }

    /// Ask the tutor to check the grammar of `text`
    ///
    /// # Errors
    ///
    /// Same as [`Self::reply`]
    pub async fn check_grammar(
        &self,
        text: &str,
        target_language: Option<&str>,
        history: &[ConversationMessage],
    ) -> Result<GrammarFeedback> {
        let language = non_blank(target_language).unwrap_or(DEFAULT_TARGET_LANGUAGE);
        let instructions = prompts::grammar_check_prompt(language, text);
        let reply = self
            .reply_with_system(text, Some(&instructions), history)
            .await?;

        Ok(GrammarFeedback {
            reply,
            original_text: text.to_string(),
            target_language: language.to_string(),
        })
    }

    /// Probe the speech backend with a short utterance
    ///
    /// Bypasses the cache and is not cancellable.
    pub async fn speech_available(&self) -> bool {
        let request = SpeechRequest {
            text: "test".to_string(),
            voice: self.tts.default_voice.clone(),
            language: self.tts.default_language.clone(),
        };
        let token = CancellationToken::new();

        match guarded(self.speech.synthesize(&request), &token, self.tts.timeout).await {
            Ok(bytes) => audio::decode_wav(&bytes).is_ok(),
            Err(e) => {
                tracing::debug!(backend = self.speech.name(), error = %e, "speech probe failed");
                false
            }
        }
    }

    /// Probe the chat backend with a short prompt
    pub async fn chat_available(&self) -> bool {
        match self
            .reply_with_system("test", Some("Reply with 'ok'"), &[])
            .await
        {
            Ok(reply) => !reply.is_empty(),
            Err(e) => {
                tracing::debug!(backend = self.chat.name(), error = %e, "chat probe failed");
                false
            }
        }
    }

    /// Voices this orchestrator can request
    #[must_use]
    pub fn available_voices(&self) -> Vec<String> {
        vec![self.tts.default_voice.clone()]
    }

    /// Number of cached speech buffers
    #[must_use]
    pub fn cache_len(&self) -> usize {
        lock(&self.cache).len()
    }

    /// Drop all cached speech buffers
    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
    }

    fn track(&self) -> (u64, CancellationToken) {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *lock(&self.in_flight) = Some(InFlight {
            id,
            token: token.clone(),
        });
        (id, token)
    }

    fn untrack(&self, id: u64) {
        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve `fut` exactly once: its output, a cancellation, or a timeout
async fn guarded<T>(
    fut: impl Future<Output = Result<T>>,
    token: &CancellationToken,
    timeout: Duration,
) -> Result<T> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::Cancelled),
        result = fut => result.map_err(|e| deadline_error(e, timeout)),
        () = tokio::time::sleep(timeout) => Err(Error::Timeout(timeout)),
    }
}

/// Report the HTTP client's own deadline the same way as ours
fn deadline_error(error: Error, timeout: Duration) -> Error {
    match error {
        Error::Http(e) if e.is_timeout() => Error::Timeout(timeout),
        other => other,
    }
}

async fn retry<T, F, Fut>(max_retries: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tracing::debug!(
                    attempt,
                    max_retries,
                    error = %e,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
