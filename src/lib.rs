//! Voice assistant core — event-driven orchestration of the
//! record → transcribe → reply → synthesize → play pipeline.
//!
//! # Layout
//!
//! ```text
//! console / server  (front-ends)
//!        │
//!        ▼
//! pipeline::OperationController ──▶ ProgressEvent ──▶ EventSubscription (per observer)
//!        │              ▲
//!        │ events::EventBus (audio.start_listening / audio.stop_listening / audio.data)
//!        ▼              │
//! audio::AudioRecorder ◀┘     stt::SttEngine → llm::ReplyGenerator → tts::Synthesizer
//!                             → audio.play → audio::PlaybackService → audio::AudioSink
//! ```

pub mod audio;
pub mod config;
pub mod console;
pub mod dialogue;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod server;
pub mod stt;
pub mod tts;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the guard if a previous holder panicked.
///
/// Every mutex in this crate guards plain data whose invariants hold between
/// statements, so a poisoned lock is still safe to read.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Attach `Authorization: Bearer …` only when `api_key` is a non-empty string,
/// so local servers that need no auth keep working.
pub(crate) fn with_bearer(
    request: reqwest::RequestBuilder,
    api_key: Option<&str>,
) -> reqwest::RequestBuilder {
    match api_key.map(str::trim) {
        Some(key) if !key.is_empty() => request.bearer_auth(key),
        _ => request,
    }
}

/// Shared HTTP client builder; a builder failure falls back to the default
/// client rather than aborting startup.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
