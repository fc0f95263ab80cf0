//! [`OperationController`] — accepts start/stop/text commands, tracks tasks,
//! and drives each task through transcription, reply generation and speech.
//!
//! # Task flow
//!
//! ```text
//! start_recording ─▶ task{Recording} + RECORDING_STARTED ─▶ audio.start_listening
//!
//! stop_recording  ─▶ active → rendezvous ─▶ RECORDING_STOPPED ─▶ audio.stop_listening
//!                    └─▶ spawn: wait audio (timeout) ─▶ task{Processing}
//!                              └─▶ stt ─▶ TRANSCRIPTION_RESULT ─┐
//! send_text       ─▶ task{Processing} ─▶ spawn ─────────────────┤
//!                                                               ▼
//!                       llm stream ─▶ REPLY_CHUNK* ─▶ REPLY_COMPLETE
//!                       tts + audio.play ─▶ SYNTHESIS_STARTED ─▶ SYNTHESIS_COMPLETE
//!                       ─▶ TASK_COMPLETE   (or TASK_ERROR from any stage)
//! ```
//!
//! Every pipeline run is awaited by a supervising task, so a failure or a
//! panic anywhere in the run becomes exactly one `TASK_ERROR` and the task
//! always leaves the active table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::{handler_fn, topics, Event, EventBus, EventHandler, EventPayload};
use crate::llm::{LlmError, ReplyGenerator};
use crate::lock;
use crate::stt::{SttEngine, SttError};
use crate::tts::{SynthesizedAudio, Synthesizer};

use super::observers::{EventSubscription, ObserverRegistry};
use super::progress::{ProgressEvent, ProgressKind};
use super::rendezvous::{AudioRendezvous, CapturedAudio};
use super::task::{TaskId, TaskIdGenerator, TaskInfo, TaskKind, TaskStatus};

/// How long a stopped voice task waits for its audio by default.
pub const DEFAULT_AUDIO_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_SOURCE: &str = "controller";
const INTERNAL_ERROR: &str = "internal error while processing the request";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Synchronous rejections returned to the caller.  None of these create a
/// task or emit progress events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("a recording is already in progress ({0})")]
    Conflict(TaskId),

    #[error("no recording is in progress")]
    NotRecording,

    #[error("input text is empty")]
    EmptyInput,

    #[error("the assistant is shutting down")]
    ShuttingDown,
}

/// Failures inside a running task; reported as `TASK_ERROR`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no audio received within {0:?}")]
    AudioTimeout(Duration),

    #[error("speech recognition is not available")]
    TranscriberUnavailable,

    #[error("speech recognition failed: {0}")]
    Transcription(#[from] SttError),

    #[error("reply generation is not available")]
    GeneratorUnavailable,

    #[error("reply generation failed: {0}")]
    Reply(#[from] LlmError),
}

// ---------------------------------------------------------------------------
// Services / options / status
// ---------------------------------------------------------------------------

/// Collaborators used by the pipeline.  Any of them may be absent: a missing
/// transcriber or generator fails the task, a missing synthesizer skips
/// speech.  Playback is whoever listens on `audio.play`.
#[derive(Clone, Default)]
pub struct PipelineServices {
    pub stt: Option<Arc<dyn SttEngine>>,
    pub llm: Option<Arc<dyn ReplyGenerator>>,
    pub tts: Option<Arc<dyn Synthesizer>>,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub audio_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            audio_timeout: DEFAULT_AUDIO_TIMEOUT,
        }
    }
}

/// Snapshot returned by [`OperationController::get_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub is_recording: bool,
    pub active_task_count: usize,
    /// Stopped voice tasks still waiting for their audio.
    pub awaiting_audio: usize,
    pub observer_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: &'static str,
    pub available: bool,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ControllerState {
    recording: Option<TaskId>,
    active: HashMap<TaskId, TaskInfo>,
    shut_down: bool,
}

enum PipelineInput {
    Text(String),
    Voice {
        info: TaskInfo,
        audio_rx: mpsc::Receiver<CapturedAudio>,
    },
}

struct Inner {
    bus: EventBus,
    services: PipelineServices,
    options: ControllerOptions,
    ids: TaskIdGenerator,
    state: Mutex<ControllerState>,
    rendezvous: Arc<AudioRendezvous>,
    observers: ObserverRegistry,
    audio_route: Arc<dyn EventHandler>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.bus.unsubscribe(topics::AUDIO_DATA, &self.audio_route);
    }
}

/// Removes a task from the active table when dropped, so a run that is torn
/// down without reaching its terminal event still releases its slot.
struct ActiveGuard {
    inner: Arc<Inner>,
    id: TaskId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.inner.state).active.remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// OperationController
// ---------------------------------------------------------------------------

/// Task orchestrator shared by every front-end.
///
/// Cheap to clone.  [`with_source`](Self::with_source) returns a handle whose
/// bus events are tagged with a different source name (`"cli"`, `"rpc"`).
///
/// ```rust,no_run
/// use voice_assistant::events::EventBus;
/// use voice_assistant::pipeline::{ControllerOptions, OperationController, PipelineServices};
///
/// # async fn example() {
/// let bus = EventBus::new();
/// let controller = OperationController::new(bus, PipelineServices::default(), ControllerOptions::default())
///     .with_source("cli");
///
/// let mut events = controller.subscribe_events();
/// let task = controller.send_text("hello").unwrap();
/// while let Some(event) = events.recv().await {
///     if event.task_id == task && event.kind.is_terminal() {
///         break;
///     }
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct OperationController {
    inner: Arc<Inner>,
    source: Arc<str>,
}

impl OperationController {
    /// Create a controller and subscribe it to `audio.data` on `bus`.
    pub fn new(bus: EventBus, services: PipelineServices, options: ControllerOptions) -> Self {
        let rendezvous = Arc::new(AudioRendezvous::new());

        let route = Arc::clone(&rendezvous);
        let audio_route = handler_fn("controller.audio", move |event: Arc<Event>| {
            let route = Arc::clone(&route);
            async move {
                if let EventPayload::AudioData {
                    task_id,
                    pcm,
                    format,
                    duration_secs,
                } = event.payload()
                {
                    route.deliver(
                        task_id,
                        CapturedAudio {
                            pcm: pcm.clone(),
                            format: *format,
                            duration_secs: *duration_secs,
                        },
                    );
                }
                Ok(())
            }
        });
        bus.subscribe(topics::AUDIO_DATA, Arc::clone(&audio_route));

        Self {
            inner: Arc::new(Inner {
                bus,
                services,
                options,
                ids: TaskIdGenerator::new(),
                state: Mutex::new(ControllerState::default()),
                rendezvous,
                observers: ObserverRegistry::new(),
                audio_route,
            }),
            source: Arc::from(DEFAULT_SOURCE),
        }
    }

    /// A handle sharing this controller's state whose events carry `source`.
    pub fn with_source(&self, source: &str) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            source: Arc::from(source),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Begin a voice task and arm the recorder.
    ///
    /// Fails with [`ControllerError::Conflict`] while another recording is in
    /// progress; no id is consumed in that case.
    ///
    /// `RECORDING_STARTED` is broadcast while the state lock is held, so a
    /// concurrent stop or shutdown can only report on the task after it.
    pub async fn start_recording(&self) -> Result<TaskId, ControllerError> {
        let id = {
            let mut state = lock(&self.inner.state);
            if state.shut_down {
                return Err(ControllerError::ShuttingDown);
            }
            if let Some(current) = &state.recording {
                log::debug!("pipeline: start rejected, {current} is recording");
                return Err(ControllerError::Conflict(current.clone()));
            }
            let id = self.inner.ids.next_id();
            state
                .active
                .insert(id.clone(), TaskInfo::new(id.clone(), TaskKind::Voice));
            state.recording = Some(id.clone());
            self.emit(&id, ProgressKind::RecordingStarted, "");
            id
        };

        log::info!("pipeline: {id} recording started (source={})", self.source);
        self.publish(EventPayload::StartListening {
            task_id: id.clone(),
        })
        .await;
        self.notify("audio", "listening", format!("recording {id}")).await;
        Ok(id)
    }

    /// End the current recording and continue the task in the background.
    ///
    /// Returns as soon as the recorder has been told to stop; the rest of the
    /// pipeline runs on its own task.
    pub async fn stop_recording(&self) -> Result<TaskId, ControllerError> {
        let (info, audio_rx) = {
            let mut state = lock(&self.inner.state);
            let Some(id) = state.recording.take() else {
                log::debug!("pipeline: stop rejected, nothing is recording");
                return Err(ControllerError::NotRecording);
            };
            let info = state
                .active
                .remove(&id)
                .unwrap_or_else(|| TaskInfo::new(id.clone(), TaskKind::Voice));
            // Registered before the stop event goes out so early audio is kept.
            let audio_rx = self.inner.rendezvous.register(id);
            (info, audio_rx)
        };
        let id = info.id.clone();

        log::info!("pipeline: {id} recording stopped (source={})", self.source);
        self.emit(&id, ProgressKind::RecordingStopped, "");
        self.spawn_pipeline(id.clone(), PipelineInput::Voice { info, audio_rx });
        self.publish(EventPayload::StopListening {
            task_id: id.clone(),
        })
        .await;
        self.notify("audio", "idle", format!("stopped {id}")).await;
        Ok(id)
    }

    /// Start a text task.  Surrounding whitespace is trimmed; blank input is
    /// rejected with [`ControllerError::EmptyInput`].
    pub fn send_text(&self, text: &str) -> Result<TaskId, ControllerError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ControllerError::EmptyInput);
        }

        let id = {
            let mut state = lock(&self.inner.state);
            if state.shut_down {
                return Err(ControllerError::ShuttingDown);
            }
            let id = self.inner.ids.next_id();
            state
                .active
                .insert(id.clone(), TaskInfo::new(id.clone(), TaskKind::Text));
            id
        };

        log::info!(
            "pipeline: {id} text task ({} chars, source={})",
            text.chars().count(),
            self.source
        );
        self.spawn_pipeline(id.clone(), PipelineInput::Text(text.to_string()));
        Ok(id)
    }

    /// Disarm any recording and announce `system.shutdown`.  Running tasks
    /// are left to finish.  Calling it again does nothing.
    pub async fn shutdown(&self) {
        let recording = {
            let mut state = lock(&self.inner.state);
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            let recording = state.recording.take();
            if let Some(id) = &recording {
                state.active.remove(id);
            }
            recording
        };

        log::info!("pipeline: shutting down (source={})", self.source);
        if let Some(id) = recording {
            self.publish(EventPayload::StopListening {
                task_id: id.clone(),
            })
            .await;
            self.emit(&id, ProgressKind::TaskError, "recording cancelled by shutdown");
        }
        self.publish(EventPayload::Shutdown).await;
        self.notify("system", "shutdown", "shutting down").await;
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Register a progress observer.  Dropping the subscription unregisters.
    pub fn subscribe_events(&self) -> EventSubscription {
        self.inner.observers.subscribe()
    }

    /// Stop delivering to `subscription`; already queued events can still be
    /// drained.  Unknown subscriptions are ignored.
    pub fn unsubscribe_events(&self, subscription: &EventSubscription) {
        self.inner.observers.unsubscribe(subscription.id());
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_status(&self) -> ControllerStatus {
        let (is_recording, active_task_count) = {
            let state = lock(&self.inner.state);
            (state.recording.is_some(), state.active.len())
        };
        ControllerStatus {
            is_recording,
            active_task_count,
            awaiting_audio: self.inner.rendezvous.len(),
            observer_count: self.inner.observers.len(),
        }
    }

    /// Snapshot of one active task.
    pub fn task(&self, id: &TaskId) -> Option<TaskInfo> {
        lock(&self.inner.state).active.get(id).cloned()
    }

    /// Configured collaborators; the player counts as available while
    /// something is subscribed to `audio.play`.
    pub fn service_status(&self) -> Vec<ServiceStatus> {
        let services = &self.inner.services;
        vec![
            ServiceStatus {
                name: "stt",
                available: services.stt.is_some(),
            },
            ServiceStatus {
                name: "llm",
                available: services.llm.is_some(),
            },
            ServiceStatus {
                name: "tts",
                available: services.tts.is_some(),
            },
            ServiceStatus {
                name: "player",
                available: self.has_player(),
            },
        ]
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.inner.state).shut_down
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    fn spawn_pipeline(&self, id: TaskId, input: PipelineInput) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let _guard = ActiveGuard {
                inner: Arc::clone(&supervisor.inner),
                id: id.clone(),
            };

            let runner = supervisor.clone();
            let run_id = id.clone();
            let run = tokio::spawn(async move { runner.run_pipeline(&run_id, input).await });

            let outcome = match run.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    log::warn!("pipeline: {id} failed: {e}");
                    Err(e.to_string())
                }
                Err(e) => {
                    log::error!("pipeline: {id} aborted: {e}");
                    Err(INTERNAL_ERROR.to_string())
                }
            };
            supervisor.conclude(&id, outcome);
        });
    }

    async fn run_pipeline(&self, id: &TaskId, input: PipelineInput) -> Result<(), PipelineError> {
        let text = match input {
            PipelineInput::Text(text) => text,
            PipelineInput::Voice { info, audio_rx } => {
                let audio = self.await_audio(id, audio_rx).await?;
                self.activate(info);
                let text = self.transcribe(id, &audio).await?;
                self.emit(id, ProgressKind::TranscriptionResult, text.as_str());
                text
            }
        };

        let reply = self.generate_reply(id, &text).await?;
        self.speak(id, &reply).await;
        Ok(())
    }

    async fn await_audio(
        &self,
        id: &TaskId,
        audio_rx: mpsc::Receiver<CapturedAudio>,
    ) -> Result<CapturedAudio, PipelineError> {
        let timeout = self.inner.options.audio_timeout;
        self.inner
            .rendezvous
            .wait_for(id, audio_rx, timeout)
            .await
            .ok_or(PipelineError::AudioTimeout(timeout))
    }

    /// Put a voice task back into the active table once its audio arrived.
    fn activate(&self, mut info: TaskInfo) {
        info.advance(TaskStatus::Processing);
        let mut state = lock(&self.inner.state);
        state.active.insert(info.id.clone(), info);
    }

    async fn transcribe(&self, id: &TaskId, audio: &CapturedAudio) -> Result<String, PipelineError> {
        let stt = self
            .inner
            .services
            .stt
            .clone()
            .ok_or(PipelineError::TranscriberUnavailable)?;
        log::debug!(
            "pipeline: {id} transcribing {:.2}s of {}",
            audio.duration_secs,
            audio.format.as_str()
        );
        let text = stt.transcribe(&audio.pcm).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SttError::EmptyTranscript.into());
        }
        Ok(text.to_string())
    }

    async fn generate_reply(&self, id: &TaskId, text: &str) -> Result<String, PipelineError> {
        let llm = self
            .inner
            .services
            .llm
            .clone()
            .ok_or(PipelineError::GeneratorUnavailable)?;

        let mut stream = llm.stream_reply(text).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            reply.push_str(&chunk);
            self.emit(id, ProgressKind::ReplyChunk, chunk);
        }

        self.emit(id, ProgressKind::ReplyComplete, reply.as_str());
        Ok(reply)
    }

    /// Best-effort synthesis and playback.  Never fails the task; when a
    /// synthesizer is configured `SYNTHESIS_STARTED` is always followed by
    /// `SYNTHESIS_COMPLETE`.
    async fn speak(&self, id: &TaskId, reply: &str) {
        let Some(tts) = self.inner.services.tts.clone() else {
            log::debug!("pipeline: {id} no synthesizer configured, skipping speech");
            return;
        };

        self.emit(id, ProgressKind::SynthesisStarted, "");
        let outcome = if reply.trim().is_empty() {
            "no audio: empty reply".to_string()
        } else {
            match tts.synthesize(reply).await {
                Ok(audio) if audio.is_empty() => "no audio".to_string(),
                Ok(audio) => {
                    if self.play(id, audio).await {
                        "played".to_string()
                    } else {
                        "synthesized".to_string()
                    }
                }
                Err(e) => {
                    log::warn!("pipeline: {id} synthesis failed: {e}");
                    format!("synthesis failed: {e}")
                }
            }
        };
        self.emit(id, ProgressKind::SynthesisComplete, outcome);
    }

    /// Hand the audio to the player over the bus and wait for it to finish.
    /// Returns `false` when nothing listens on `audio.play`.  Playback
    /// failures are reported by the player on `system.status`.
    async fn play(&self, id: &TaskId, audio: SynthesizedAudio) -> bool {
        if !self.has_player() {
            log::debug!("pipeline: {id} no player attached, audio not played");
            return false;
        }
        self.publish(EventPayload::PlayAudio {
            task_id: id.clone(),
            audio: audio.bytes,
            format: audio.format,
        })
        .await;
        true
    }

    fn has_player(&self) -> bool {
        self.inner.bus.subscriber_count(topics::PLAY_AUDIO) > 0
    }

    /// Record the final status, release the task and emit its single
    /// terminal event.
    fn conclude(&self, id: &TaskId, outcome: Result<(), String>) {
        let final_status = if outcome.is_ok() {
            TaskStatus::Complete
        } else {
            TaskStatus::Error
        };
        if let Some(mut info) = lock(&self.inner.state).active.remove(id) {
            info.advance(final_status);
        }

        match outcome {
            Ok(()) => {
                log::info!("pipeline: {id} complete");
                self.emit(id, ProgressKind::TaskComplete, "");
            }
            Err(message) => self.emit(id, ProgressKind::TaskError, message),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn emit(&self, id: &TaskId, kind: ProgressKind, content: impl Into<String>) {
        let event = ProgressEvent::new(id.clone(), kind, content);
        log::debug!("pipeline: {id} {}", kind.as_str());
        self.inner.observers.broadcast(&event);
    }

    async fn notify(&self, component: &str, status: &str, message: impl Into<String>) {
        self.publish(EventPayload::Status {
            component: component.to_string(),
            status: status.to_string(),
            message: message.into(),
        })
        .await;
    }

    async fn publish(&self, payload: EventPayload) {
        self.inner
            .bus
            .publish(Event::new(self.source.as_ref(), payload))
            .await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
