//! STT (speech-to-text) collaborator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  SttEngine (async trait)             │
//! │                                                      │
//! │   PCM 16-bit LE mono ──▶ HttpSttEngine               │
//! │                          - wrap in WAV (hound)       │
//! │                          - multipart POST            │
//! │                            /v1/audio/transcriptions  │
//! │                          - { "text": … } ──▶ String  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_assistant::config::SttConfig;
//! use voice_assistant::stt::{HttpSttEngine, SttEngine};
//!
//! # async fn run() {
//! let engine = HttpSttEngine::from_config(&SttConfig::default());
//! let pcm: Vec<u8> = vec![0; 32_000]; // 1 s of silence @ 16 kHz
//! match engine.transcribe(&pcm).await {
//!     Ok(text) => println!("{text}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! # }
//! ```

pub mod engine;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{HttpSttEngine, SttEngine, SttError};

// test-only re-export so the pipeline tests can import MockSttEngine directly.
#[cfg(test)]
pub use engine::MockSttEngine;
