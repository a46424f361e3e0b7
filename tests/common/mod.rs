//! Shared test utilities

#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;

use tutor_voice::config::ChatProvider;
use tutor_voice::{Config, LlmConfig, RequestOrchestrator, TtsConfig};

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    format!("http://{addr}")
}

/// Encode 16-bit PCM samples as a WAV file
pub fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("failed to create writer");
        for &sample in samples {
            writer.write_sample(sample).expect("failed to write sample");
        }
        writer.finalize().expect("failed to finalize wav");
    }
    cursor.into_inner()
}

/// A short mono clip used as the canned TTS answer
pub fn greeting_wav() -> Vec<u8> {
    wav_bytes(1, 22_050, &[0, 8_192, -8_192, 16_384, -16_384, 0])
}

/// Speech config pointing at a mock server
pub fn tts_config(base_url: &str) -> TtsConfig {
    TtsConfig {
        service_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        retry_delay: Duration::from_millis(10),
        ..TtsConfig::default()
    }
}

/// Chat config pointing at a mock server
pub fn llm_config(provider: ChatProvider, base_url: &str) -> LlmConfig {
    LlmConfig {
        service_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        retry_delay: Duration::from_millis(10),
        ..LlmConfig::for_provider(provider)
    }
}

/// Build an orchestrator from the given configs
pub fn orchestrator(tts: TtsConfig, llm: LlmConfig) -> RequestOrchestrator {
    RequestOrchestrator::from_config(&Config { tts, llm }).expect("failed to build orchestrator")
}
