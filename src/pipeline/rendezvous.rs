//! Hand-off of captured audio from the recorder to the task awaiting it.
//!
//! ```text
//! stop_recording ── register(id) ──▶ [id → Sender(cap 1)]
//!                                          ▲
//! audio.data handler ── deliver(id, pcm) ──┘   (try_send, never blocks)
//!
//! pipeline task ── wait_for(id, rx, timeout) ── removes [id] on every path
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::AudioFormat;
use crate::lock;

use super::task::TaskId;

/// Audio captured for a single voice task.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub pcm: Vec<u8>,
    pub format: AudioFormat,
    pub duration_secs: f32,
}

/// Per-task single-slot channels keyed by [`TaskId`].
#[derive(Default)]
pub struct AudioRendezvous {
    pending: Mutex<HashMap<TaskId, mpsc::Sender<CapturedAudio>>>,
}

impl AudioRendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the slot for `id`.  Must happen before the stop event is
    /// published so an early delivery is not lost.
    pub fn register(&self, id: TaskId) -> mpsc::Receiver<CapturedAudio> {
        let (tx, rx) = mpsc::channel(1);
        lock(&self.pending).insert(id, tx);
        rx
    }

    /// Route audio to the waiter for `id`.
    ///
    /// Returns `false` when nobody is waiting (unknown id, already timed out)
    /// or the slot is already filled.  Never blocks.
    pub fn deliver(&self, id: &TaskId, audio: CapturedAudio) -> bool {
        let pending = lock(&self.pending);
        match pending.get(id) {
            Some(tx) => match tx.try_send(audio) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("pipeline: audio for {id} not delivered: {e}");
                    false
                }
            },
            None => {
                log::debug!("pipeline: no waiter for audio of {id}, dropping");
                false
            }
        }
    }

    /// Wait up to `timeout` for audio.  The slot is removed whether or not
    /// audio arrived.
    pub async fn wait_for(
        &self,
        id: &TaskId,
        mut rx: mpsc::Receiver<CapturedAudio>,
        timeout: Duration,
    ) -> Option<CapturedAudio> {
        let received = tokio::time::timeout(timeout, rx.recv()).await;
        self.remove(id);
        match received {
            Ok(audio) => audio,
            Err(_) => {
                log::warn!("pipeline: {id} timed out after {timeout:?} waiting for audio");
                None
            }
        }
    }

    pub fn remove(&self, id: &TaskId) -> bool {
        lock(&self.pending).remove(id).is_some()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        lock(&self.pending).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
