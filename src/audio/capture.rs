//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] opens the default input device.  Its callback forwards
//! raw [`AudioChunk`]s over a std `mpsc` channel; a feeder thread
//! ([`AudioCapture::start_feeding`]) down-mixes and resamples them to 16 kHz
//! and hands them to the [`AudioRecorder`].  The recorder drops samples while
//! it is not armed, so the stream can run for the life of the process.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::recorder::AudioRecorder;
use super::resample::{downmix_to_mono, resample_to_16k};

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One buffer from the cpal callback: interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    /// Mono 16 kHz view of this chunk.
    pub fn to_mono_16k(&self) -> Vec<f32> {
        resample_to_16k(&downmix_to_mono(&self.samples, self.channels), self.sample_rate)
    }
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// Keeps the cpal input stream alive; dropping it stops capture.
///
/// `cpal::Stream` is not `Send` on every platform, so this must stay on the
/// thread that created it.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn audio feeder thread: {0}")]
    Feeder(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Default-input-device wrapper.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the system default input device with its preferred config.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "audio: input device {:?} @ {sample_rate} Hz, {channels} ch",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start the stream, sending every callback buffer to `tx`.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Receiver gone means the feeder exited; nothing to do.
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| log::error!("audio: input stream error: {err}"),
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    /// Start the stream and a feeder thread that pushes 16 kHz mono samples
    /// into `recorder`.  The thread exits when the returned handle is dropped.
    pub fn start_feeding(&self, recorder: AudioRecorder) -> Result<StreamHandle, CaptureError> {
        let (tx, rx) = mpsc::channel::<AudioChunk>();
        let handle = self.start(tx)?;

        thread::Builder::new()
            .name("audio-feeder".into())
            .spawn(move || {
                while let Ok(chunk) = rx.recv() {
                    recorder.feed(&chunk.to_mono_16k());
                }
                log::debug!("audio: feeder thread exiting");
            })?;

        Ok(handle)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn chunk_converts_to_mono_16k() {
        let chunk = AudioChunk {
            samples: vec![0.5_f32; 960],
            sample_rate: 48_000,
            channels: 2,
        };
        let mono = chunk.to_mono_16k();
        assert_eq!(mono.len(), 160);
        assert!(mono.iter().all(|s| (s - 0.5).abs() < 1e-5));
    }
}
