use aiui_stream::protocol::{iat_transcript, SemanticResult, TextBlock, TidyResult};
use aiui_stream::{
    Config, PayloadSource, RequestMode, ResponseEvent, SessionCoordinator, TtsRecorder,
    WsConnector,
};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "aiui-stream", about = "Stream audio or text to the AIUI v3 service")]
struct Cli {
    /// Configuration file, extension optional
    #[arg(short, long, default_value = "config/aiui-stream")]
    config: String,

    #[arg(long, value_enum)]
    mode: Option<RequestMode>,

    /// Audio file to upload (raw PCM, or 16kHz mono WAV)
    #[arg(long)]
    audio: Option<String>,

    /// Question for a text request
    #[arg(long)]
    text: Option<String>,

    /// Save synthesized speech into this directory
    #[arg(long)]
    tts_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;

    if let Some(mode) = cli.mode {
        cfg.request.mode = mode;
    }
    if let Some(audio) = cli.audio {
        cfg.request.audio_path = Some(audio);
    }
    if let Some(text) = cli.text {
        cfg.request.text = Some(text);
    }
    if let Some(dir) = cli.tts_dir {
        cfg.output.tts_dir = Some(dir);
    }

    let session_config = cfg.session_config()?;

    let payload = match cfg.request.mode {
        RequestMode::Audio => {
            let path = cfg
                .audio_path()?
                .context("request.audio_path is required for audio requests")?;
            info!("Audio request from {}", path);
            PayloadSource::open_audio(&path).await?
        }
        RequestMode::Text => {
            let text = cfg
                .request
                .text
                .clone()
                .context("request.text is required for text requests")?;
            info!("Text request: {}", text);
            PayloadSource::text(text)
        }
    };

    let recorder = match &cfg.output.tts_dir {
        Some(dir) => Some(TtsRecorder::new(shellexpand::full(dir)?.into_owned(), cfg.output.tts_wav)?),
        None => None,
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx, recorder));

    let coordinator = SessionCoordinator::new(
        session_config,
        WsConnector::new(cfg.service.receive_buffer_bytes, cfg.handshake_timeout()),
    );
    let result = coordinator.run(payload, events_tx).await;

    if let Err(e) = printer.await {
        error!("Event printer panicked: {}", e);
    }

    match result {
        Ok(report) => {
            info!(
                "Session {} finished in {:.1}s ({} frames sent, {} received, {} text results)",
                report.sid.as_deref().unwrap_or("-"),
                report.duration_secs,
                report.frames_sent,
                report.frames_received,
                report.text_events
            );
            Ok(())
        }
        Err(e) => {
            error!("Session failed: {}", e);
            if let aiui_stream::SessionError::Server { raw, .. } = &e {
                error!("Server response: {}", raw);
            }
            std::process::exit(e.exit_code());
        }
    }
}

/// Print results as they arrive and save any synthesized speech
async fn print_events(
    mut events: mpsc::UnboundedReceiver<ResponseEvent>,
    mut recorder: Option<TtsRecorder>,
) {
    while let Some(event) = events.recv().await {
        match &event {
            ResponseEvent::Text(block) if block.block == "iat" => {
                match iat_transcript(&block.text) {
                    Some(transcript) => println!("iat: {}", transcript),
                    None => println!("{}", event),
                }
            }
            ResponseEvent::Text(block) if block.block == "cbm_tidy" => {
                match TidyResult::parse(&block.text) {
                    Some(tidy) => {
                        for intent in &tidy.intents {
                            println!("tidy intent {}: {}", intent.index, intent.value);
                        }
                    }
                    None => println!("{}", event),
                }
            }
            ResponseEvent::Text(block) if block.block == "cbm_intent_domain" => {
                println!("intent {} domain: {}", intent_of(block), block.text);
            }
            ResponseEvent::Text(block) if block.block == "cbm_semantic" => {
                match SemanticResult::parse(&block.text) {
                    Some(result) if result.matched() => println!(
                        "intent {} skill {}: {} -> {}",
                        intent_of(block),
                        result.category.as_deref().unwrap_or("-"),
                        result.text.as_deref().unwrap_or_default(),
                        result.answer.as_deref().unwrap_or_default()
                    ),
                    _ => println!("intent {} {}", intent_of(block), event),
                }
            }
            ResponseEvent::Speech { sid, chunk } => {
                if let Some(recorder) = &mut recorder {
                    if let Err(e) = recorder.write(sid.as_deref(), chunk) {
                        warn!("Failed to save synthesized speech: {}", e);
                    }
                }
            }
            _ => println!("{}", event),
        }
    }

    if let Some(recorder) = &mut recorder {
        if let Err(e) = recorder.finish() {
            warn!("Failed to finalize synthesized speech: {}", e);
        }
    }
}

fn intent_of(block: &TextBlock) -> &str {
    block.intent.as_deref().unwrap_or("-")
}
