//! [`Session`] — a persisted conversation and its index entry.
//!
//! On disk a session is one JSON document:
//!
//! ```text
//! {
//!   "session_id": "…uuid…",
//!   "created_at": "…", "updated_at": "…",
//!   "messages": [ { "role": "user", "content": "…", "timestamp": "…" } ],
//!   "metadata": { "title": "…", "context": { "user_name": "…", … } }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ChatMessage;

use super::message::{Message, Role};

/// Title shown before the first user message arrives.
pub const DEFAULT_TITLE: &str = "New conversation";

const TITLE_CHARS: usize = 30;
const PREVIEW_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Facts learned about the user during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preferences: Vec<String>,
}

impl SessionContext {
    pub fn is_empty(&self) -> bool {
        self.user_name.is_none() && self.location.is_none() && self.preferences.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    pub title: Option<String>,
    pub context: SessionContext,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            metadata: SessionMetadata::default(),
        }
    }

    /// Append a message; the first user message also becomes the title.
    pub fn add_message(&mut self, message: Message) {
        if self.metadata.title.is_none() && message.role == Role::User {
            self.metadata.title = Some(truncate(&message.content, TITLE_CHARS));
        }
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// The last `limit` messages, without system messages.
    pub fn history(&self, limit: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages[skip..]
            .iter()
            .filter(|m| m.role != Role::System)
            .map(Message::to_chat)
            .collect()
    }

    /// Drop every message and forget the learned context.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.metadata.context = SessionContext::default();
        self.updated_at = Utc::now();
    }

    pub fn summary(&self) -> SessionSummary {
        let preview = self
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| truncate(&m.content, PREVIEW_CHARS))
            .unwrap_or_default();
        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            title: self.title().to_string(),
            preview,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            message_count: self.messages.len(),
            title: self.title().to_string(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Entry of `sessions_index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub preview: String,
}

/// What front-ends show about the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub title: String,
}

/// First `max` characters of `text`, with `...` appended when cut.
pub fn truncate(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
