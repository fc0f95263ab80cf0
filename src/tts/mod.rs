//! TTS (text-to-speech) collaborator.
//!
//! [`Synthesizer`] turns reply text into audio bytes tagged with their
//! [`AudioFormat`](crate::audio::AudioFormat); [`HttpSynthesizer`] calls an
//! OpenAI-compatible `/v1/audio/speech` endpoint.

pub mod engine;

pub use engine::{HttpSynthesizer, SynthesizedAudio, Synthesizer, TtsError};
