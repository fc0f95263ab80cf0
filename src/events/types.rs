//! Event records carried by the [`EventBus`](super::EventBus).
//!
//! An [`Event`] is immutable once constructed; the bus shares it between
//! handlers as an `Arc<Event>`.

use chrono::{DateTime, Utc};

use crate::audio::AudioFormat;
use crate::pipeline::TaskId;

/// Well-known topic names.
pub mod topics {
    /// Arm the recorder for a new voice task.
    pub const START_LISTENING: &str = "audio.start_listening";
    /// Disarm the recorder and flush the captured audio.
    pub const STOP_LISTENING: &str = "audio.stop_listening";
    /// Captured audio for a voice task.
    pub const AUDIO_DATA: &str = "audio.data";
    /// Ask the player to render synthesized audio.
    pub const PLAY_AUDIO: &str = "audio.play";
    /// Component state changes (`listening`, `idle`, `error`, …).
    pub const STATUS: &str = "system.status";
    pub const SHUTDOWN: &str = "system.shutdown";
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Typed body of an [`Event`].
///
/// Every variant has a canonical topic (see [`EventPayload::topic`]).
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    StartListening {
        task_id: TaskId,
    },
    StopListening {
        task_id: TaskId,
    },
    /// Mono 16-bit little-endian samples recorded for `task_id`.
    AudioData {
        task_id: TaskId,
        pcm: Vec<u8>,
        format: AudioFormat,
        duration_secs: f32,
    },
    /// Synthesized reply for `task_id`; the publisher waits for playback.
    PlayAudio {
        task_id: TaskId,
        audio: Vec<u8>,
        format: AudioFormat,
    },
    /// Component state report (`component` = `"audio"`, `"player"`, …).
    Status {
        component: String,
        status: String,
        message: String,
    },
    Shutdown,
}

impl EventPayload {
    /// The topic this payload is published under by default.
    pub fn topic(&self) -> &'static str {
        match self {
            EventPayload::StartListening { .. } => topics::START_LISTENING,
            EventPayload::StopListening { .. } => topics::STOP_LISTENING,
            EventPayload::AudioData { .. } => topics::AUDIO_DATA,
            EventPayload::PlayAudio { .. } => topics::PLAY_AUDIO,
            EventPayload::Status { .. } => topics::STATUS,
            EventPayload::Shutdown => topics::SHUTDOWN,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A message published on the bus.
#[derive(Debug, Clone)]
pub struct Event {
    topic: String,
    source: String,
    created_at: DateTime<Utc>,
    payload: EventPayload,
}

impl Event {
    /// Build an event on the payload's canonical topic.
    ///
    /// `source` names the component or front-end that produced it
    /// (`"cli"`, `"rpc"`, `"recorder"`, …).
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self::with_topic(payload.topic(), source, payload)
    }

    /// Build an event on an explicit topic.
    pub fn with_topic(
        topic: impl Into<String>,
        source: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            topic: topic.into(),
            source: source.into(),
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// The task this event refers to, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match &self.payload {
            EventPayload::StartListening { task_id }
            | EventPayload::StopListening { task_id }
            | EventPayload::AudioData { task_id, .. }
            | EventPayload::PlayAudio { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
