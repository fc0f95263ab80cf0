//! Reply generation.
//!
//! This module provides:
//! * [`ReplyGenerator`] — text in, streamed reply out; what the controller
//!   calls.
//! * [`ChatBackend`] — full message list in, streamed reply out.
//! * [`ChatClient`] — OpenAI-compatible streaming implementation of both.
//! * [`SseDecoder`] / [`ThinkFilter`] — stream decoding helpers.
//! * [`PromptBuilder`] — persona system prompt with time and memory.
//! * [`LlmError`] — error variants for LLM operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use voice_assistant::config::LlmConfig;
//! use voice_assistant::llm::{ChatClient, ReplyGenerator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ChatClient::from_config(&LlmConfig::default());
//!     let mut reply = client.stream_reply("Tell me a joke").await.unwrap();
//!     while let Some(chunk) = reply.next().await {
//!         print!("{}", chunk.unwrap());
//!     }
//! }
//! ```

pub mod chat;
pub mod prompt;
pub mod sse;
pub mod think;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use chat::{decode_stream, ChatBackend, ChatClient, ChatMessage, LlmError, ReplyGenerator, ReplyStream};
pub use prompt::PromptBuilder;
pub use sse::{SseData, SseDecoder};
pub use think::ThinkFilter;
