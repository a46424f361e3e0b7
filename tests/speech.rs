//! Speech synthesis integration tests
//!
//! Runs the real HTTP backend against an in-process mock TTS server

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde_json::{Value, json};

use tutor_voice::config::ChatProvider;
use tutor_voice::{DecodeError, Error};

mod common;

#[derive(Default)]
struct TtsMock {
    calls: AtomicUsize,
    forms: Mutex<Vec<HashMap<String, String>>>,
    reply: Value,
}

impl TtsMock {
    fn replying(reply: Value) -> Arc<Self> {
        Arc::new(Self {
            reply,
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn generate(
    State(mock): State<Arc<TtsMock>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    mock.calls.fetch_add(1, Ordering::SeqCst);
    mock.forms.lock().unwrap().push(form);
    Json(mock.reply.clone())
}

async fn tts_server(mock: Arc<TtsMock>) -> String {
    let router = Router::new()
        .route("/api/tts-generate", post(generate))
        .route("/audio/out.wav", get(|| async { common::greeting_wav() }))
        .with_state(mock);
    common::serve(router).await
}

fn inline(bytes: &[u8]) -> Value {
    json!({"audio_base64": base64::engine::general_purpose::STANDARD.encode(bytes)})
}

fn orchestrator_for(base_url: &str) -> tutor_voice::RequestOrchestrator {
    common::orchestrator(
        common::tts_config(base_url),
        common::llm_config(ChatProvider::Ollama, "http://127.0.0.1:9"),
    )
}

#[tokio::test]
async fn test_inline_audio_is_decoded_and_cached() {
    let mock = TtsMock::replying(inline(&common::greeting_wav()));
    let base = tts_server(Arc::clone(&mock)).await;
    let orchestrator = orchestrator_for(&base);

    let first = orchestrator.synthesize("Guten Tag", None, None).await.unwrap();
    let second = orchestrator.synthesize("Guten Tag", None, None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(mock.calls(), 1);
    assert_eq!(first.channels(), 1);
    assert_eq!(first.sample_rate(), 22_050);
    assert_eq!(first.samples().len(), 6);
    assert!((first.samples()[1] - 0.25).abs() < f32::EPSILON);
    assert!(first.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
}

#[tokio::test]
async fn test_form_fields_use_resolved_defaults() {
    let mock = TtsMock::replying(inline(&common::greeting_wav()));
    let base = tts_server(Arc::clone(&mock)).await;
    let orchestrator = orchestrator_for(&base);

    orchestrator.synthesize("Bonjour", None, Some("fr")).await.unwrap();

    let forms = mock.forms.lock().unwrap();
    let form = &forms[0];
    assert_eq!(form["text_input"], "Bonjour");
    assert_eq!(form["character_voice"], "male_01.wav");
    assert_eq!(form["language"], "fr");
    assert_eq!(form["text_filtering"], "standard");
    assert_eq!(form["autoplay"], "false");
    assert_eq!(form["narrator_enabled"], "false");
}

#[tokio::test]
async fn test_distinct_voices_are_cached_separately() {
    let mock = TtsMock::replying(inline(&common::greeting_wav()));
    let base = tts_server(Arc::clone(&mock)).await;
    let orchestrator = orchestrator_for(&base);

    orchestrator.synthesize("Hola", Some("female_01.wav"), None).await.unwrap();
    orchestrator.synthesize("Hola", Some("male_02.wav"), None).await.unwrap();

    assert_eq!(mock.calls(), 2);
    assert_eq!(orchestrator.cache_len(), 2);

    orchestrator.clear_cache();
    assert_eq!(orchestrator.cache_len(), 0);
}

#[tokio::test]
async fn test_local_file_location_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.wav");
    std::fs::write(&path, common::greeting_wav()).unwrap();

    let mock = TtsMock::replying(json!({
        "output_file_path": path.to_str().unwrap(),
        "output_file_url": "/audio/missing.wav",
    }));
    let base = tts_server(mock).await;
    let orchestrator = orchestrator_for(&base);

    let buffer = orchestrator.synthesize("Ciao", None, Some("it")).await.unwrap();
    assert_eq!(buffer.frames(), 6);
}

#[tokio::test]
async fn test_file_url_location_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.wav");
    std::fs::write(&path, common::greeting_wav()).unwrap();

    let mock = TtsMock::replying(json!({
        "output_file_path": format!("file://{}", path.display()),
    }));
    let base = tts_server(mock).await;
    let orchestrator = orchestrator_for(&base);

    let buffer = orchestrator.synthesize("Ciao", None, None).await.unwrap();
    assert_eq!(buffer.sample_rate(), 22_050);
}

#[tokio::test]
async fn test_falls_back_to_relative_url() {
    let mock = TtsMock::replying(json!({
        "output_file_path": "/srv/alltalk/outputs/not-on-this-machine.wav",
        "output_file_url": "/audio/out.wav",
    }));
    let base = tts_server(mock).await;
    let orchestrator = orchestrator_for(&base);

    let buffer = orchestrator.synthesize("Olá", None, Some("pt")).await.unwrap();
    assert_eq!(buffer.frames(), 6);
}

#[tokio::test]
async fn test_missing_audio_is_empty_result() {
    let mock = TtsMock::replying(json!({"status": "generate-success", "output_file_path": ""}));
    let base = tts_server(mock).await;
    let orchestrator = orchestrator_for(&base);

    let err = orchestrator.synthesize("Hallo", None, None).await.unwrap_err();
    assert!(matches!(err, Error::EmptyResult));
    assert_eq!(orchestrator.cache_len(), 0);
}

#[tokio::test]
async fn test_non_wav_payload_fails_decode() {
    let body = br#"{"detail":"voice female_99.wav was not found on this server"}"#;
    let mock = TtsMock::replying(inline(body));
    let base = tts_server(mock).await;
    let orchestrator = orchestrator_for(&base);

    let err = orchestrator.synthesize("Hallo", None, None).await.unwrap_err();
    assert!(matches!(err, Error::DecodeFailed(DecodeError::NotRiff { .. })));
    assert_eq!(orchestrator.cache_len(), 0);
}

#[tokio::test]
async fn test_server_error_is_retryable_status() {
    let router = Router::new().route(
        "/api/tts-generate",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
    );
    let base = common::serve(router).await;
    let orchestrator = orchestrator_for(&base);

    let err = orchestrator.synthesize("Hallo", None, None).await.unwrap_err();
    match &err {
        Error::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "model not loaded");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failure() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let router = Router::new().route(
        "/api/tts-generate",
        post({
            let attempts = Arc::clone(&attempts);
            move || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
                    } else {
                        (StatusCode::OK, Json(inline(&common::greeting_wav())))
                    }
                }
            }
        }),
    );
    let base = common::serve(router).await;
    let orchestrator = orchestrator_for(&base);

    let buffer = orchestrator
        .synthesize_with_retry("Hallo", None, None)
        .await
        .unwrap();
    assert_eq!(buffer.frames(), 6);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let router = Router::new().route(
        "/api/tts-generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({}))
        }),
    );
    let base = common::serve(router).await;
    let mut tts = common::tts_config(&base);
    tts.timeout = Duration::from_millis(200);
    let orchestrator = common::orchestrator(
        tts,
        common::llm_config(ChatProvider::Ollama, "http://127.0.0.1:9"),
    );

    let err = orchestrator.synthesize("Hallo", None, None).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(200)));
    assert!(!orchestrator.is_synthesizing());
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_request() {
    let router = Router::new().route(
        "/api/tts-generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({}))
        }),
    );
    let base = common::serve(router).await;
    let orchestrator = Arc::new(orchestrator_for(&base));

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.synthesize("Hallo", None, None).await }
    });

    while !orchestrator.is_synthesizing() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    orchestrator.cancel_synthesis();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(orchestrator.cache_len(), 0);
}

#[tokio::test]
async fn test_probe_reports_speech_health() {
    let mock = TtsMock::replying(inline(&common::greeting_wav()));
    let base = tts_server(Arc::clone(&mock)).await;
    assert!(orchestrator_for(&base).speech_available().await);

    assert!(!orchestrator_for("http://127.0.0.1:9").speech_available().await);
}

#[test]
fn test_malformed_service_url_fails_before_any_request() {
    let config = tutor_voice::Config {
        tts: common::tts_config("127.0.0.1:7851"),
        llm: common::llm_config(ChatProvider::Ollama, "http://127.0.0.1:9"),
    };

    let err = tutor_voice::RequestOrchestrator::from_config(&config).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err:?}");
    assert_eq!(err.kind(), tutor_voice::ErrorKind::Config);
    assert!(!err.is_retryable());
}
