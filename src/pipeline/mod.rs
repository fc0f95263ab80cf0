//! Task orchestration: the state every front-end drives.
//!
//! # Architecture
//!
//! ```text
//! console / HTTP front-end
//!        │  start_recording / stop_recording / send_text
//!        ▼
//! OperationController ───── audio.start_listening / audio.stop_listening ──▶ EventBus
//!        │                                                                    │
//!        │  AudioRendezvous ◀──────────── audio.data{task_id, pcm} ───────────┘
//!        │        (one capacity-1 channel per stopped voice task)
//!        │
//!        ├─ tokio task per pipeline run (supervised)
//!        │     stt ─▶ llm stream ─▶ tts ─▶ audio.play (awaits the player)
//!        │
//!        └─ ObserverRegistry ──▶ EventSubscription (one per client)
//!                                  ProgressEvent{task_id, type, content, timestamp}
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_assistant::config::LlmConfig;
//! use voice_assistant::events::EventBus;
//! use voice_assistant::llm::ChatClient;
//! use voice_assistant::pipeline::{ControllerOptions, OperationController, PipelineServices};
//!
//! #[tokio::main]
//! async fn main() {
//!     let services = PipelineServices {
//!         llm: Some(Arc::new(ChatClient::from_config(&LlmConfig::default()))),
//!         ..PipelineServices::default()
//!     };
//!     let controller =
//!         OperationController::new(EventBus::new(), services, ControllerOptions::default());
//!
//!     let mut events = controller.subscribe_events();
//!     controller.send_text("good morning").unwrap();
//!     while let Some(event) = events.recv().await {
//!         println!("{} {}", event.kind.as_str(), event.content);
//!         if event.kind.is_terminal() {
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod controller;
pub mod observers;
pub mod progress;
pub mod rendezvous;
pub mod task;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::{
    ControllerError, ControllerOptions, ControllerStatus, OperationController, PipelineError,
    PipelineServices, ServiceStatus, DEFAULT_AUDIO_TIMEOUT,
};
pub use observers::{EventSubscription, ObserverId, ObserverRegistry};
pub use progress::{ProgressEvent, ProgressKind};
pub use rendezvous::{AudioRendezvous, CapturedAudio};
pub use task::{TaskId, TaskIdGenerator, TaskInfo, TaskKind, TaskStatus};
