//! Conversation memory.
//!
//! # Architecture
//!
//! ```text
//! ConversationalGenerator (ReplyGenerator)
//!        │ user turn / assistant turn
//!        ▼
//! DialogueManager ── ContextExtractor (name / location / likes)
//!        │           PromptBuilder    (persona system prompt)
//!        ▼
//! SessionStore ──▶ <storage_dir>/<session_id>.json
//!                  <storage_dir>/sessions_index.json
//! ```

pub mod context;
pub mod generator;
pub mod manager;
pub mod message;
pub mod session;
pub mod store;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use context::ContextExtractor;
pub use generator::ConversationalGenerator;
pub use manager::DialogueManager;
pub use message::{Message, Role};
pub use session::{Session, SessionContext, SessionInfo, SessionMetadata, SessionSummary};
pub use store::{SessionError, SessionStore};
