//! In-process publish/subscribe event bus.
//!
//! Loosely-coupled components (the audio recorder, the operation controller,
//! front-ends) talk to each other by publishing [`Event`]s on named topics.
//!
//! # Topics
//!
//! ```text
//! audio.start_listening  ── controller ─▶ recorder   (arm capture)
//! audio.stop_listening   ── controller ─▶ recorder   (disarm + flush)
//! audio.data             ── recorder   ─▶ controller (captured PCM for a task)
//! audio.play             ── controller ─▶ player     (blocks until played)
//! system.status          ── controller, player ─▶ status log
//! system.shutdown        ── controller ─▶ anyone
//! ```
//!
//! Subscriptions match either an exact topic or a wildcard prefix ending in
//! `*` (`"audio.*"` matches every `audio.` topic).  One-shot subscriptions are
//! removed the first time they match.

pub mod bus;
pub mod types;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use bus::{handler_fn, EventBus, EventHandler, HandlerError, WeakEventBus, MAX_HISTORY};
pub use types::{topics, Event, EventPayload};
