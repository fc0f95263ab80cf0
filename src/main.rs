//! Application entry point — voice assistant.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (`--config` or the platform settings file).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the [`EventBus`] bound to that runtime and attach the
//!    [`AudioRecorder`], the [`PlaybackService`] and a `system.status` logger.
//! 5. Start cpal capture on the main thread (the stream handle must stay
//!    here); the feeder thread pushes 16 kHz mono into the recorder.
//! 6. Open session storage and build the dialogue manager.
//! 7. Build the collaborators and the [`OperationController`].
//! 8. Run the chosen front-end until it exits or Ctrl-C arrives, then shut
//!    the controller down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use voice_assistant::{
    audio::{
        AudioCapture, AudioRecorder, CpalPlayer, PlaybackService, StreamHandle, TARGET_SAMPLE_RATE,
    },
    config::{AppConfig, AppPaths},
    console::Console,
    dialogue::{ConversationalGenerator, DialogueManager, SessionStore},
    events::{handler_fn, topics, EventBus, EventPayload},
    llm::{ChatClient, PromptBuilder, ReplyGenerator},
    pipeline::{ControllerOptions, OperationController, PipelineServices},
    server,
    stt::{HttpSttEngine, SttEngine},
    tts::{HttpSynthesizer, Synthesizer},
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "voice-assistant", version, about = "Voice assistant pipeline")]
struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive console (default).
    Console,
    /// HTTP API with a Server-Sent-Events progress stream.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Capture is optional: without a microphone the assistant still answers
/// text, and voice tasks time out waiting for audio.
fn start_capture(config: &AppConfig, recorder: &AudioRecorder) -> Option<StreamHandle> {
    if !config.audio.capture_enabled {
        log::info!("audio capture disabled in settings");
        return None;
    }
    let capture = match AudioCapture::new() {
        Ok(capture) => capture,
        Err(e) => {
            log::warn!("audio capture unavailable: {e}");
            return None;
        }
    };
    match capture.start_feeding(recorder.clone()) {
        Ok(handle) => {
            log::info!(
                "audio capture started ({} Hz, {} ch)",
                capture.sample_rate(),
                capture.channels()
            );
            Some(handle)
        }
        Err(e) => {
            log::warn!("failed to start audio stream: {e}");
            None
        }
    }
}

async fn open_dialogue(config: &AppConfig) -> Option<Arc<DialogueManager>> {
    let dir = config.session.resolved_dir(&AppPaths::new());
    let store = match SessionStore::open(&dir, config.session.index_limit).await {
        Ok(store) => store,
        Err(e) => {
            log::warn!("sessions disabled, cannot open {}: {e}", dir.display());
            return None;
        }
    };

    let prompt = PromptBuilder::new(
        &config.persona.assistant_name,
        config.persona.base_prompt.as_deref(),
    );
    let dialogue = DialogueManager::new(store, prompt, config.session.history_limit);
    match dialogue.initialize(config.session.resume_latest).await {
        Ok(info) => log::info!(
            "conversation {} \"{}\" ({} messages)",
            info.session_id,
            info.title,
            info.message_count
        ),
        Err(e) => log::warn!("could not open a conversation: {e}"),
    }
    Some(Arc::new(dialogue))
}

fn build_services(config: &AppConfig, dialogue: Option<Arc<DialogueManager>>) -> PipelineServices {
    let stt = config
        .stt
        .enabled
        .then(|| Arc::new(HttpSttEngine::from_config(&config.stt)) as Arc<dyn SttEngine>);

    let llm = config.llm.enabled.then(|| {
        let client = Arc::new(ChatClient::from_config(&config.llm));
        match dialogue {
            Some(dialogue) => {
                Arc::new(ConversationalGenerator::new(dialogue, client)) as Arc<dyn ReplyGenerator>
            }
            None => client as Arc<dyn ReplyGenerator>,
        }
    });

    let tts = config
        .tts
        .enabled
        .then(|| Arc::new(HttpSynthesizer::from_config(&config.tts)) as Arc<dyn Synthesizer>);

    PipelineServices { stt, llm, tts }
}

/// Bus listeners that live as long as the process: playback and a log line
/// per component state change.
fn attach_listeners(config: &AppConfig, bus: &EventBus) {
    if config.audio.playback_enabled {
        PlaybackService::new(Arc::new(CpalPlayer::new(config.tts.sample_rate))).attach(bus);
    } else {
        log::info!("audio playback disabled in settings");
    }

    bus.subscribe(
        topics::STATUS,
        handler_fn("status.log", |event| async move {
            if let EventPayload::Status {
                component,
                status,
                message,
            } = event.payload()
            {
                log::info!("[{}] {component}: {status} ({message})", event.source());
            }
            Ok(())
        }),
    );
}

async fn run(cli: Cli, config: AppConfig, bus: EventBus) -> Result<()> {
    let dialogue = open_dialogue(&config).await;
    let services = build_services(&config, dialogue.clone());
    let controller = OperationController::new(
        bus,
        services,
        ControllerOptions {
            audio_timeout: config.audio.audio_wait_timeout(),
        },
    );

    match cli.command.unwrap_or(Command::Console) {
        Command::Console => {
            let console = Console::new(
                &controller,
                dialogue,
                std::io::stdout(),
                &config.persona.assistant_name,
            );
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = console.run(stdin) => result?,
                _ = tokio::signal::ctrl_c() => log::info!("interrupted"),
            }
        }
        Command::Serve { host, port } => {
            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            let addr = server_config.socket_addr()?;
            let router = server::router(&controller, dialogue);
            server::serve(addr, router, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::warn!("cannot listen for Ctrl-C: {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await?;
        }
    }

    controller.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Configuration
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("failed to load settings ({e:#}); using defaults");
            AppConfig::default()
        }),
    };
    log::info!("voice assistant starting up");
    if config.audio.sample_rate != TARGET_SAMPLE_RATE {
        log::warn!(
            "audio.sample_rate {} ignored; capture is always delivered at {TARGET_SAMPLE_RATE} Hz",
            config.audio.sample_rate
        );
    }

    // 3. Tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Event bus, recorder and listeners
    let bus = EventBus::with_runtime(runtime.handle().clone());
    let recorder = AudioRecorder::new(TARGET_SAMPLE_RATE, config.audio.max_recording_secs);
    recorder.attach(&bus);
    attach_listeners(&config, &bus);

    // 5. Capture (kept alive on this thread until the front-end exits)
    let _capture = start_capture(&config, &recorder);

    // 6–8. Dialogue, collaborators, controller and front-end
    runtime.block_on(run(cli, config, bus))
}
