use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tutor_voice::{Config, RequestOrchestrator, TutorMode, audio};

/// Tutor Voice - speech and reply pipeline for language tutors
#[derive(Parser)]
#[command(name = "tutor-voice", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize speech and optionally save it as WAV
    Speak {
        /// Text to speak
        text: String,
        /// Voice identifier
        #[arg(long)]
        voice: Option<String>,
        /// Language code
        #[arg(short, long)]
        language: Option<String>,
        /// Write the decoded audio to this WAV file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Ask the tutor for a reply
    Chat {
        /// What the learner says
        prompt: String,
        /// Tutoring mode
        #[arg(short, long, value_enum, default_value_t = TutorMode::General)]
        mode: TutorMode,
    },
    /// Check the grammar of a sentence
    Grammar {
        /// Sentence to check
        text: String,
        /// Language being learned
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Decode a WAV file and print its format
    Decode {
        /// Path to the WAV file
        file: PathBuf,
    },
    /// Probe the configured backends
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,tutor_voice=info",
        1 => "info,tutor_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Decode { file } = &cli.command {
        return decode_file(file);
    }

    let config = Config::load(cli.config.as_deref())?;
    let orchestrator = RequestOrchestrator::from_config(&config)?;

    match cli.command {
        Command::Speak {
            text,
            voice,
            language,
            out,
        } => speak(&orchestrator, &text, voice.as_deref(), language.as_deref(), out).await,
        Command::Chat { prompt, mode } => {
            let reply = orchestrator.reply_in_mode(&prompt, mode, &[]).await?;
            println!("{reply}");
            Ok(())
        }
        Command::Grammar { text, language } => {
            let feedback = orchestrator
                .check_grammar(&text, language.as_deref(), &[])
                .await?;
            println!("[{}] {}", feedback.target_language, feedback.reply);
            Ok(())
        }
        Command::Check => {
            check(&orchestrator, &config).await;
            Ok(())
        }
        Command::Decode { .. } => Ok(()),
    }
}

async fn speak(
    orchestrator: &RequestOrchestrator,
    text: &str,
    voice: Option<&str>,
    language: Option<&str>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Synthesizing speech...");
    let buffer = orchestrator
        .synthesize_with_retry(text, voice, language)
        .await?;

    println!(
        "Got {} frames ({} ch, {} Hz, {:.2}s)",
        buffer.frames(),
        buffer.channels(),
        buffer.sample_rate(),
        buffer.duration().as_secs_f64()
    );

    if let Some(path) = out {
        let wav = audio::encode_wav(&buffer)?;
        tokio::fs::write(&path, wav).await?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn decode_file(path: &std::path::Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)?;
    let decoded = audio::decode_wav(&bytes)?;
    let buffer = &decoded.buffer;

    println!("File: {}", path.display());
    println!("  Channels:    {}", buffer.channels());
    println!("  Sample rate: {} Hz", buffer.sample_rate());
    println!("  Bit depth:   {}", decoded.bits_per_sample);
    println!("  Data offset: {}", decoded.data_offset);
    println!("  Frames:      {}", buffer.frames());
    println!("  Duration:    {:.2}s", buffer.duration().as_secs_f64());
    if decoded.is_truncated() {
        println!("  Truncated:   {} trailing bytes dropped", decoded.dropped_bytes);
    }

    Ok(())
}

async fn check(orchestrator: &RequestOrchestrator, config: &Config) {
    let (speech, chat) = tokio::join!(orchestrator.speech_available(), orchestrator.chat_available());
    let status = |ok: bool| if ok { "ok" } else { "unavailable" };

    println!("Speech ({}): {}", config.tts.full_url(), status(speech));
    println!(
        "Chat   ({}, {} @ {}): {}",
        config.llm.provider,
        config.llm.model,
        config.llm.full_url(),
        status(chat)
    );
    println!("Voices: {}", orchestrator.available_voices().join(", "));
}
