//! [`AudioRecorder`] — bus-driven capture buffer.
//!
//! ```text
//! audio.start_listening{task}  → clear buffer, arm, remember task
//! feed(samples)                → appended only while armed (capped)
//! audio.stop_listening{task}   → disarm, publish audio.data{task, pcm}
//!                                (nothing is published for an empty buffer)
//! ```

use std::sync::{Arc, Mutex};

use crate::events::{handler_fn, topics, Event, EventBus, EventPayload};
use crate::lock;
use crate::pipeline::TaskId;

use super::pcm::{self, AudioFormat};

const SOURCE: &str = "recorder";

#[derive(Default)]
struct RecorderState {
    armed: bool,
    task: Option<TaskId>,
    samples: Vec<f32>,
}

/// Audio captured between an arm and a disarm.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub task: Option<TaskId>,
    pub samples: Vec<f32>,
}

/// Microphone buffer armed and disarmed over the event bus.
///
/// Cheap to clone; the capture feeder thread and the bus handlers share one
/// buffer.
#[derive(Clone)]
pub struct AudioRecorder {
    state: Arc<Mutex<RecorderState>>,
    sample_rate: u32,
    max_samples: usize,
}

impl AudioRecorder {
    /// `sample_rate` is the rate of the samples passed to [`feed`](Self::feed);
    /// anything beyond `max_recording_secs` is discarded.
    pub fn new(sample_rate: u32, max_recording_secs: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::default())),
            sample_rate,
            max_samples: (sample_rate as f32 * max_recording_secs.max(0.0)) as usize,
        }
    }

    /// Subscribe to the start/stop topics on `bus`.
    pub fn attach(&self, bus: &EventBus) {
        let recorder = self.clone();
        bus.subscribe(
            topics::START_LISTENING,
            handler_fn("recorder.start", move |event: Arc<Event>| {
                let recorder = recorder.clone();
                async move {
                    if let EventPayload::StartListening { task_id } = event.payload() {
                        recorder.start(Some(task_id.clone()));
                    }
                    Ok(())
                }
            }),
        );

        let recorder = self.clone();
        let weak_bus = bus.downgrade();
        bus.subscribe(
            topics::STOP_LISTENING,
            handler_fn("recorder.stop", move |event: Arc<Event>| {
                let recorder = recorder.clone();
                let weak_bus = weak_bus.clone();
                async move {
                    let EventPayload::StopListening { task_id } = event.payload() else {
                        return Ok(());
                    };
                    let recording = recorder.stop();
                    let Some(payload) = recorder.audio_payload(task_id.clone(), &recording) else {
                        log::warn!("audio: no audio captured for {task_id}");
                        return Ok(());
                    };
                    if let Some(bus) = weak_bus.upgrade() {
                        bus.publish(Event::new(SOURCE, payload)).await;
                    }
                    Ok(())
                }
            }),
        );
    }

    /// Clear the buffer and start accepting samples.
    pub fn start(&self, task: Option<TaskId>) {
        let mut state = lock(&self.state);
        state.samples.clear();
        state.armed = true;
        log::info!(
            "audio: recording started{}",
            task.as_ref().map(|t| format!(" for {t}")).unwrap_or_default()
        );
        state.task = task;
    }

    /// Stop accepting samples and take what was captured.
    pub fn stop(&self) -> Recording {
        let mut state = lock(&self.state);
        state.armed = false;
        let recording = Recording {
            task: state.task.take(),
            samples: std::mem::take(&mut state.samples),
        };
        log::info!(
            "audio: recording stopped, {:.2}s captured",
            recording.samples.len() as f32 / self.sample_rate.max(1) as f32
        );
        recording
    }

    /// Append mono samples if armed.  Called from the capture feeder thread.
    pub fn feed(&self, samples: &[f32]) {
        let mut state = lock(&self.state);
        if !state.armed {
            return;
        }
        let room = self.max_samples.saturating_sub(state.samples.len());
        if room == 0 {
            return;
        }
        let take = samples.len().min(room);
        state.samples.extend_from_slice(&samples[..take]);
        if take < samples.len() {
            log::warn!("audio: recording reached its length cap, dropping further samples");
        }
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.state).armed
    }

    pub fn buffered_samples(&self) -> usize {
        lock(&self.state).samples.len()
    }

    fn audio_payload(&self, task_id: TaskId, recording: &Recording) -> Option<EventPayload> {
        if recording.samples.is_empty() {
            return None;
        }
        let bytes = pcm::samples_to_bytes(&pcm::f32_to_i16(&recording.samples));
        Some(EventPayload::AudioData {
            task_id,
            duration_secs: pcm::pcm_duration_secs(bytes.len(), self.sample_rate),
            pcm: bytes,
            format: AudioFormat::Pcm,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
