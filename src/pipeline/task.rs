//! Task identity and lifecycle.
//!
//! ```text
//! Voice:  Recording ──stop──▶ (awaiting audio) ──audio──▶ Processing ──▶ Complete
//! Text:                                                   Processing ──▶ Complete
//! any non-terminal ──failure──▶ Error
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Opaque, process-unique task identifier (`task_<counter>_<unix-millis>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        TaskId(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId(value.to_string())
    }
}

/// Monotonic id source.  The counter guarantees uniqueness within a process
/// even when two ids are minted in the same millisecond.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    counter: AtomicU64,
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> TaskId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let millis = Utc::now().timestamp_millis();
        TaskId(format!("task_{n}_{millis}"))
    }
}

// ---------------------------------------------------------------------------
// TaskKind / TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Started by `start_recording`; input comes from the microphone.
    Voice,
    /// Started by `send_text`.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Recording,
    Processing,
    Complete,
    Error,
}

impl TaskStatus {
    /// `Complete` and `Error` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// ```
    /// use voice_assistant::pipeline::TaskStatus;
    ///
    /// assert!(TaskStatus::Recording.can_transition_to(TaskStatus::Processing));
    /// assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Error));
    /// assert!(!TaskStatus::Complete.can_transition_to(TaskStatus::Processing));
    /// ```
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Recording, TaskStatus::Processing) => true,
            (TaskStatus::Processing, TaskStatus::Complete) => true,
            (s, TaskStatus::Error) => !s.is_terminal(),
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Recording => "Recording",
            TaskStatus::Processing => "Processing",
            TaskStatus::Complete => "Done",
            TaskStatus::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// TaskInfo
// ---------------------------------------------------------------------------

/// Snapshot of one unit of work tracked by the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl TaskInfo {
    pub fn new(id: TaskId, kind: TaskKind) -> Self {
        let status = match kind {
            TaskKind::Voice => TaskStatus::Recording,
            TaskKind::Text => TaskStatus::Processing,
        };
        Self {
            id,
            kind,
            status,
            created_at: Utc::now(),
        }
    }

    /// Move to `next` if the transition is legal; returns whether it was.
    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            log::warn!(
                "pipeline: {} rejected transition {} → {}",
                self.id,
                self.status.label(),
                next.label()
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
