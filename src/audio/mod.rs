//! Audio boundary — microphone capture, the bus-driven recorder, PCM/WAV
//! helpers and blocking playback.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (std mpsc) → feeder thread
//!           → downmix + resample_to_16k → AudioRecorder::feed
//!
//! audio.stop_listening → AudioRecorder → audio.data (16-bit LE PCM @ 16 kHz)
//!
//! audio.play → PlaybackService → AudioSink::play (spawn_blocking) → cpal output
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_assistant::audio::{AudioCapture, AudioRecorder};
//! use voice_assistant::events::EventBus;
//!
//! let bus = EventBus::new();
//! let recorder = AudioRecorder::new(16_000, 60.0);
//! recorder.attach(&bus);
//!
//! let capture = AudioCapture::new().unwrap();
//! let _stream = capture.start_feeding(recorder).unwrap(); // drop → stop
//! ```

pub mod capture;
pub mod pcm;
pub mod player;
pub mod recorder;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use pcm::{AudioFormat, DecodedAudio};
pub use player::{AudioSink, CpalPlayer, PlaybackError, PlaybackService};
pub use recorder::{AudioRecorder, Recording};
pub use resample::{downmix_to_mono, resample, resample_to_16k, upmix_from_mono, TARGET_SAMPLE_RATE};
