//! Blocking audio playback, driven from the event bus.
//!
//! ```text
//! audio.play{task, audio, format} → PlaybackService
//!     └─ spawn_blocking(AudioSink::play)  (returns when playback ends)
//!           └─ Err → system.status{player, error}
//! ```
//!
//! [`AudioSink::play`] returns only after the audio has finished (or failed).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::events::{handler_fn, topics, Event, EventBus, EventPayload};
use crate::lock;

use super::pcm::{self, AudioFormat};
use super::resample::{resample, upmix_from_mono};

/// Extra time allowed past the nominal clip length before giving up.
const PLAYBACK_GRACE: Duration = Duration::from_secs(2);
/// Let the device drain its last buffer before the stream is dropped.
const DRAIN_TAIL: Duration = Duration::from_millis(120);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("could not decode audio: {0}")]
    Decode(#[from] hound::Error),

    #[error("playback did not finish in time")]
    Stalled,
}

/// Something that can render audio bytes.
pub trait AudioSink: Send + Sync {
    /// Play `audio` and block until it has finished.
    fn play(&self, audio: &[u8], format: AudioFormat) -> Result<(), PlaybackError>;
}

// ---------------------------------------------------------------------------
// CpalPlayer
// ---------------------------------------------------------------------------

/// Plays through the default output device.
///
/// Calls are serialized; a second `play` waits for the first to finish.
pub struct CpalPlayer {
    pcm_sample_rate: u32,
    busy: Mutex<()>,
}

impl CpalPlayer {
    /// `pcm_sample_rate` is the rate assumed for headerless PCM input.
    pub fn new(pcm_sample_rate: u32) -> Self {
        Self {
            pcm_sample_rate,
            busy: Mutex::new(()),
        }
    }
}

impl AudioSink for CpalPlayer {
    fn play(&self, audio: &[u8], format: AudioFormat) -> Result<(), PlaybackError> {
        let decoded = pcm::decode(audio, format, self.pcm_sample_rate)?;
        if decoded.samples.is_empty() {
            return Ok(());
        }

        let _serial = lock(&self.busy);

        let device = cpal::default_host()
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;
        let supported = device.default_output_config()?;
        let channels = supported.channels();
        let device_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let frames = resample(&decoded.samples, decoded.sample_rate, device_rate);
        let nominal = Duration::from_secs_f32(frames.len() as f32 / device_rate.max(1) as f32);
        let interleaved = upmix_from_mono(&frames, channels);

        let (done_tx, done_rx) = mpsc::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let mut cursor = 0usize;

        let stream = device.build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let remaining = interleaved.len().saturating_sub(cursor);
                let n = remaining.min(out.len());
                out[..n].copy_from_slice(&interleaved[cursor..cursor + n]);
                out[n..].fill(0.0);
                cursor += n;
                if cursor >= interleaved.len() && !flag.swap(true, Ordering::SeqCst) {
                    let _ = done_tx.send(());
                }
            },
            |err: cpal::StreamError| log::error!("audio: output stream error: {err}"),
            None,
        )?;
        stream.play()?;
        log::debug!("audio: playing {:.2}s at {device_rate} Hz", nominal.as_secs_f32());

        let outcome = done_rx.recv_timeout(nominal + PLAYBACK_GRACE);
        std::thread::sleep(DRAIN_TAIL);
        drop(stream);

        match outcome {
            Ok(()) => Ok(()),
            Err(_) if finished.load(Ordering::SeqCst) => Ok(()),
            Err(_) => Err(PlaybackError::Stalled),
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackService
// ---------------------------------------------------------------------------

const SOURCE: &str = "player";

/// Plays every `audio.play` event through an [`AudioSink`].
///
/// The bus awaits the handler, so a publisher of `audio.play` resumes only
/// once playback has ended.
#[derive(Clone)]
pub struct PlaybackService {
    sink: Arc<dyn AudioSink>,
}

impl PlaybackService {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink }
    }

    /// Subscribe to `audio.play` on `bus`.
    pub fn attach(&self, bus: &EventBus) {
        let service = self.clone();
        let weak_bus = bus.downgrade();
        bus.subscribe(
            topics::PLAY_AUDIO,
            handler_fn("player.play", move |event: Arc<Event>| {
                let service = service.clone();
                let weak_bus = weak_bus.clone();
                async move {
                    let EventPayload::PlayAudio {
                        task_id,
                        audio,
                        format,
                    } = event.payload()
                    else {
                        return Ok(());
                    };

                    let Err(e) = service.play(audio.clone(), *format).await else {
                        log::debug!("audio: {task_id} playback finished");
                        return Ok(());
                    };

                    if let Some(bus) = weak_bus.upgrade() {
                        bus.publish(Event::new(
                            SOURCE,
                            EventPayload::Status {
                                component: SOURCE.into(),
                                status: "error".into(),
                                message: format!("{task_id}: {e}"),
                            },
                        ))
                        .await;
                    }
                    Err(anyhow::anyhow!("{task_id} playback failed: {e}"))
                }
            }),
        );
    }

    async fn play(&self, audio: Vec<u8>, format: AudioFormat) -> Result<(), String> {
        let sink = Arc::clone(&self.sink);
        match tokio::task::spawn_blocking(move || sink.play(&audio, format)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("playback task failed: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::pipeline::TaskId;

    /// Counts plays; fails when `fail` is set.
    #[derive(Default)]
    struct RecordingSink {
        plays: AtomicUsize,
        fail: bool,
    }

    impl AudioSink for RecordingSink {
        fn play(&self, _audio: &[u8], _format: AudioFormat) -> Result<(), PlaybackError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PlaybackError::Stalled)
            } else {
                Ok(())
            }
        }
    }

    fn play_event() -> Event {
        Event::new(
            "test",
            EventPayload::PlayAudio {
                task_id: TaskId::from("task_1_0"),
                audio: vec![1, 2],
                format: AudioFormat::Pcm,
            },
        )
    }

    // ---- bus playback ---

    #[tokio::test]
    async fn play_event_blocks_until_sink_finishes() {
        let bus = EventBus::new();
        let sink = Arc::new(RecordingSink::default());
        PlaybackService::new(sink.clone()).attach(&bus);
        assert_eq!(bus.subscriber_count(topics::PLAY_AUDIO), 1);

        bus.publish(play_event()).await;

        assert_eq!(sink.plays.load(Ordering::SeqCst), 1);
        assert!(bus
            .history(10)
            .iter()
            .all(|e| e.topic() != topics::STATUS));
    }

    #[tokio::test]
    async fn failed_playback_reports_status() {
        let bus = EventBus::new();
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        PlaybackService::new(sink).attach(&bus);

        bus.publish(play_event()).await;

        let history = bus.history(10);
        let status = history
            .iter()
            .find(|e| e.topic() == topics::STATUS)
            .expect("status event");
        match status.payload() {
            EventPayload::Status {
                component,
                status,
                message,
            } => {
                assert_eq!(component, "player");
                assert_eq!(status, "error");
                assert!(message.contains("task_1_0"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    // ---- cpal player ---

    #[test]
    fn player_is_object_safe_and_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CpalPlayer>();
        let _sink: Arc<dyn AudioSink> = Arc::new(CpalPlayer::new(24_000));
    }

    #[test]
    fn empty_audio_returns_without_touching_a_device() {
        let player = CpalPlayer::new(24_000);
        assert!(player.play(&[], AudioFormat::Pcm).is_ok());
    }

    #[test]
    fn undecodable_wav_is_reported() {
        let player = CpalPlayer::new(24_000);
        let err = player.play(b"garbage", AudioFormat::Wav).unwrap_err();
        assert!(matches!(err, PlaybackError::Decode(_)));
    }
}
