//! Progress notifications delivered to observers.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Stage reached by a task.
///
/// Serialized as SCREAMING_SNAKE_CASE (`"REPLY_CHUNK"`) for wire clients;
/// [`ProgressKind::as_str`] gives the kebab-case name used in logs and SSE
/// event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressKind {
    RecordingStarted,
    RecordingStopped,
    TranscriptionResult,
    ReplyChunk,
    ReplyComplete,
    SynthesisStarted,
    SynthesisComplete,
    TaskComplete,
    TaskError,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::RecordingStarted => "recording-started",
            ProgressKind::RecordingStopped => "recording-stopped",
            ProgressKind::TranscriptionResult => "transcription-result",
            ProgressKind::ReplyChunk => "reply-chunk",
            ProgressKind::ReplyComplete => "reply-complete",
            ProgressKind::SynthesisStarted => "synthesis-started",
            ProgressKind::SynthesisComplete => "synthesis-complete",
            ProgressKind::TaskComplete => "task-complete",
            ProgressKind::TaskError => "task-error",
        }
    }

    /// Exactly one terminal event is emitted per task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressKind::TaskComplete | ProgressKind::TaskError)
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub content: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl ProgressEvent {
    pub fn new(task_id: TaskId, kind: ProgressKind, content: impl Into<String>) -> Self {
        Self {
            task_id,
            kind,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
