//! [`EventBus`] — topic-based publish/subscribe with async handlers.
//!
//! # Dispatch model
//!
//! ```text
//! publish(event)
//!   ├─ append to debug history (last MAX_HISTORY events)
//!   ├─ collect: exact[topic] + wildcard prefixes + drained one-shots
//!   └─ tokio::spawn one task per handler, await them all
//!         └─ Err / panic → logged, never propagated to the publisher
//! ```
//!
//! Handlers are compared by `Arc` identity, so the same `Arc<dyn EventHandler>`
//! must be passed to [`EventBus::unsubscribe`] that was passed to
//! [`EventBus::subscribe`].

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::lock;

use super::types::Event;

/// Number of published events retained for debugging.
pub const MAX_HISTORY: usize = 100;

/// Error type returned by handlers.  The bus only logs it.
pub type HandlerError = anyhow::Error;

// ---------------------------------------------------------------------------
// EventHandler
// ---------------------------------------------------------------------------

/// A subscriber callback.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError>;
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        (self.f)(event).await
    }
}

/// Wrap an async closure as an [`EventHandler`].
///
/// ```rust,no_run
/// use voice_assistant::events::{handler_fn, topics, EventBus};
///
/// let bus = EventBus::new();
/// bus.subscribe(
///     topics::STATUS,
///     handler_fn("printer", |event| async move {
///         println!("{:?}", event.payload());
///         Ok(())
///     }),
/// );
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f: move |event: Arc<Event>| -> BoxFuture<'static, Result<(), HandlerError>> {
            Box::pin(f(event))
        },
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type Handlers = Vec<Arc<dyn EventHandler>>;

#[derive(Default)]
struct Registry {
    exact: HashMap<String, Handlers>,
    wildcard: HashMap<String, Handlers>,
    once: HashMap<String, Handlers>,
}

impl Registry {
    /// Handlers matching `topic`, draining any one-shot registrations.
    fn take_matching(&mut self, topic: &str) -> Handlers {
        let mut matched = Vec::new();

        if let Some(handlers) = self.exact.get(topic) {
            matched.extend(handlers.iter().cloned());
        }
        for (pattern, handlers) in &self.wildcard {
            if pattern_matches(pattern, topic) {
                matched.extend(handlers.iter().cloned());
            }
        }

        let fired: Vec<String> = self
            .once
            .keys()
            .filter(|pattern| pattern_matches(pattern, topic))
            .cloned()
            .collect();
        for pattern in fired {
            if let Some(handlers) = self.once.remove(&pattern) {
                matched.extend(handlers);
            }
        }

        matched
    }

    /// Registrations that would fire for `topic`, without draining one-shots.
    fn count_matching(&self, topic: &str) -> usize {
        let exact = self.exact.get(topic).map_or(0, Vec::len);
        let patterned: usize = self
            .wildcard
            .iter()
            .chain(self.once.iter())
            .filter(|(pattern, _)| pattern_matches(pattern, topic))
            .map(|(_, handlers)| handlers.len())
            .sum();
        exact + patterned
    }
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.ends_with('*')
}

/// `"audio.*"` matches `"audio.data"`; anything else must match exactly.
fn pattern_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

/// Remove the first registration of `handler` (by identity) from `list`.
fn remove_handler(list: &mut Handlers, handler: &Arc<dyn EventHandler>) -> bool {
    match list.iter().position(|h| Arc::ptr_eq(h, handler)) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

struct BusInner {
    registry: Mutex<Registry>,
    history: Mutex<VecDeque<Arc<Event>>>,
    runtime: Option<Handle>,
}

/// Shared publish/subscribe bus.
///
/// Cheap to clone; all clones refer to the same registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Non-owning handle to an [`EventBus`].
///
/// Handlers that publish back onto the bus hold one of these so the bus does
/// not keep itself alive through its own registry.
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus, capturing the current tokio runtime (if any) for
    /// [`publish_sync`](Self::publish_sync) calls made from plain threads.
    pub fn new() -> Self {
        Self::build(Handle::try_current().ok())
    }

    /// Create a bus bound to an explicit runtime handle.
    pub fn with_runtime(handle: Handle) -> Self {
        Self::build(Some(handle))
    }

    fn build(runtime: Option<Handle>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
                runtime,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Register `handler` for `pattern`.
    ///
    /// Registering the same handler twice means it is invoked twice per
    /// matching event.
    pub fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) {
        log::debug!("bus: {} subscribed to {pattern}", handler.name());
        let mut registry = lock(&self.inner.registry);
        let table = if is_wildcard(pattern) {
            &mut registry.wildcard
        } else {
            &mut registry.exact
        };
        table.entry(pattern.to_string()).or_default().push(handler);
    }

    /// Register `handler` for the next matching event only.
    pub fn subscribe_once(&self, pattern: &str, handler: Arc<dyn EventHandler>) {
        log::debug!("bus: {} subscribed once to {pattern}", handler.name());
        lock(&self.inner.registry)
            .once
            .entry(pattern.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove one registration of `handler` under `pattern`.
    ///
    /// Returns `false` (and does nothing) when no such registration exists.
    pub fn unsubscribe(&self, pattern: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let mut registry = lock(&self.inner.registry);
        let table = if is_wildcard(pattern) {
            &mut registry.wildcard
        } else {
            &mut registry.exact
        };

        let mut removed = false;
        if let Some(list) = table.get_mut(pattern) {
            removed = remove_handler(list, handler);
            if list.is_empty() {
                table.remove(pattern);
            }
        }
        if !removed {
            if let Some(list) = registry.once.get_mut(pattern) {
                removed = remove_handler(list, handler);
                if list.is_empty() {
                    registry.once.remove(pattern);
                }
            }
        }

        if removed {
            log::debug!("bus: {} unsubscribed from {pattern}", handler.name());
        }
        removed
    }

    /// Deliver `event` to every matching handler and wait for all of them.
    ///
    /// Handlers run concurrently in their own tasks.  A handler that fails or
    /// panics is logged; the remaining handlers still complete and the
    /// publisher never sees the failure.
    pub async fn publish(&self, event: Event) {
        let event = Arc::new(event);
        self.record(&event);

        let handlers = lock(&self.inner.registry).take_matching(event.topic());
        if handlers.is_empty() {
            log::trace!("bus: no subscribers for {}", event.topic());
            return;
        }
        log::debug!(
            "bus: {} from {} → {} handler(s)",
            event.topic(),
            event.source(),
            handlers.len()
        );

        let running: Vec<_> = handlers
            .into_iter()
            .map(|handler| {
                let event = Arc::clone(&event);
                let name = handler.name().to_string();
                (name, tokio::spawn(async move { handler.handle(event).await }))
            })
            .collect();

        for (name, task) in running {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("bus: handler {name} failed on {}: {e:#}", event.topic())
                }
                Err(e) => log::error!("bus: handler {name} panicked on {}: {e}", event.topic()),
            }
        }
    }

    /// Fire-and-forget publish usable from non-async code.
    ///
    /// Uses the calling thread's runtime when there is one, otherwise the
    /// runtime captured at construction.  Without either the event is dropped
    /// with a warning.
    pub fn publish_sync(&self, event: Event) {
        let handle = Handle::try_current()
            .ok()
            .or_else(|| self.inner.runtime.clone());
        match handle {
            Some(handle) => {
                let bus = self.clone();
                handle.spawn(async move { bus.publish(event).await });
            }
            None => log::warn!(
                "bus: no async runtime available, dropping {} event",
                event.topic()
            ),
        }
    }

    /// Number of registrations (one-shots included) that `topic` would reach.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.inner.registry).count_matching(topic)
    }

    /// The most recent `limit` events, oldest first.
    pub fn history(&self, limit: usize) -> Vec<Arc<Event>> {
        let history = lock(&self.inner.history);
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        lock(&self.inner.history).clear();
    }

    fn record(&self, event: &Arc<Event>) {
        let mut history = lock(&self.inner.history);
        if history.len() == MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(Arc::clone(event));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::events::types::{topics, EventPayload};

    struct Counter {
        hits: AtomicUsize,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
            })
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn handle(&self, _event: Arc<Event>) -> Result<(), HandlerError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: Arc<Event>) -> Result<(), HandlerError> {
            anyhow::bail!("boom")
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn handle(&self, _event: Arc<Event>) -> Result<(), HandlerError> {
            panic!("handler panic")
        }
    }

    fn status(message: &str) -> EventPayload {
        EventPayload::Status {
            component: "test".into(),
            status: "ok".into(),
            message: message.into(),
        }
    }

    fn status_event(message: &str) -> Event {
        Event::new("test", status(message))
    }

    fn listen_event() -> Event {
        Event::new(
            "test",
            EventPayload::StartListening {
                task_id: "task_1_0".into(),
            },
        )
    }

    // ---- pattern matching ---

    #[test]
    fn wildcard_matches_prefix_only() {
        assert!(pattern_matches("audio.*", "audio.data"));
        assert!(pattern_matches("*", "anything"));
        assert!(!pattern_matches("audio.*", "text.input"));
        assert!(pattern_matches("text.input", "text.input"));
        assert!(!pattern_matches("text.input", "text.input.extra"));
    }

    #[test]
    fn subscriber_count_includes_wildcards_and_one_shots() {
        let bus = EventBus::build(None);
        bus.subscribe(topics::AUDIO_DATA, Counter::new());
        bus.subscribe("audio.*", Counter::new());
        bus.subscribe_once("*", Counter::new());
        bus.subscribe(topics::STATUS, Counter::new());

        assert_eq!(bus.subscriber_count(topics::AUDIO_DATA), 3);
        assert_eq!(bus.subscriber_count(topics::STATUS), 2);
        assert_eq!(bus.subscriber_count("other.topic"), 1);
    }

    // ---- subscribe / publish ---

    #[tokio::test]
    async fn exact_subscriber_receives_event() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(topics::STATUS, counter.clone());

        bus.publish(status_event("hi")).await;
        bus.publish(listen_event()).await;

        assert_eq!(counter.hits(), 1);
    }

    #[tokio::test]
    async fn wildcard_subscriber_receives_all_matching_topics() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe("system.*", counter.clone());

        bus.publish(status_event("hi")).await;
        bus.publish(Event::new("test", EventPayload::Shutdown)).await;
        bus.publish(listen_event()).await;

        assert_eq!(counter.hits(), 2);
    }

    #[tokio::test]
    async fn once_subscriber_fires_a_single_time() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe_once(topics::STATUS, counter.clone());

        bus.publish(status_event("a")).await;
        bus.publish(status_event("b")).await;

        assert_eq!(counter.hits(), 1);
        assert_eq!(bus.subscriber_count(topics::STATUS), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_is_invoked_twice() {
        let bus = EventBus::new();
        let counter = Counter::new();
        let handler: Arc<dyn EventHandler> = counter.clone();
        bus.subscribe(topics::STATUS, Arc::clone(&handler));
        bus.subscribe(topics::STATUS, Arc::clone(&handler));

        bus.publish(status_event("hi")).await;
        assert_eq!(counter.hits(), 2);

        assert!(bus.unsubscribe(topics::STATUS, &handler));
        bus.publish(status_event("again")).await;
        assert_eq!(counter.hits(), 3);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(status_event("nobody listens")).await;
        assert_eq!(bus.subscriber_count(topics::STATUS), 0);
        assert_eq!(bus.history(10).len(), 1);
    }

    // ---- unsubscribe ---

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let counter = Counter::new();
        let handler: Arc<dyn EventHandler> = counter.clone();
        bus.subscribe("system.*", Arc::clone(&handler));

        assert!(bus.unsubscribe("system.*", &handler));
        bus.publish(status_event("hi")).await;

        assert_eq!(counter.hits(), 0);
        assert_eq!(bus.subscriber_count(topics::STATUS), 0);
    }

    #[test]
    fn unsubscribe_unknown_handler_is_noop() {
        let bus = EventBus::new();
        let registered: Arc<dyn EventHandler> = Counter::new();
        let stranger: Arc<dyn EventHandler> = Counter::new();
        bus.subscribe(topics::STATUS, registered);

        assert!(!bus.unsubscribe(topics::STATUS, &stranger));
        assert!(!bus.unsubscribe("never.subscribed", &stranger));
        assert_eq!(bus.subscriber_count(topics::STATUS), 1);
    }

    // ---- failure isolation ---

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(topics::STATUS, Arc::new(Failing));
        bus.subscribe(topics::STATUS, counter.clone());

        bus.publish(status_event("hi")).await;

        assert_eq!(counter.hits(), 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(topics::STATUS, Arc::new(Panicking));
        bus.subscribe("system.*", counter.clone());

        bus.publish(status_event("hi")).await;

        assert_eq!(counter.hits(), 1);
    }

    // ---- publish_sync ---

    #[tokio::test]
    async fn publish_sync_delivers_on_current_runtime() {
        let bus = EventBus::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            topics::STATUS,
            handler_fn("forward", move |event| {
                let tx = tx.clone();
                async move {
                    tx.send(event.topic().to_string())?;
                    Ok(())
                }
            }),
        );

        bus.publish_sync(status_event("hi"));

        let topic = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out");
        assert_eq!(topic.as_deref(), Some(topics::STATUS));
    }

    #[test]
    fn publish_sync_from_plain_thread_uses_captured_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let bus = EventBus::with_runtime(rt.handle().clone());
        let (tx, rx) = std::sync::mpsc::channel();
        bus.subscribe(
            topics::STATUS,
            handler_fn("forward", move |_event| {
                let tx = tx.clone();
                async move {
                    tx.send(())?;
                    Ok(())
                }
            }),
        );

        let publisher = bus.clone();
        std::thread::spawn(move || publisher.publish_sync(status_event("hi")))
            .join()
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn publish_sync_without_runtime_drops_event() {
        let bus = EventBus::build(None);
        bus.publish_sync(status_event("lost"));
        assert!(bus.history(10).is_empty());
    }

    // ---- history ---

    #[tokio::test]
    async fn history_is_bounded() {
        let bus = EventBus::new();
        for i in 0..(MAX_HISTORY + 5) {
            bus.publish(status_event(&i.to_string())).await;
        }

        let all = bus.history(usize::MAX);
        assert_eq!(all.len(), MAX_HISTORY);
        assert_eq!(
            all[0].payload(),
            &status("5")
        );

        let last = bus.history(2);
        assert_eq!(last.len(), 2);
        assert_eq!(
            last[1].payload(),
            &status(&(MAX_HISTORY + 4).to_string())
        );

        bus.clear_history();
        assert!(bus.history(10).is_empty());
    }

    #[test]
    fn weak_handle_does_not_keep_bus_alive() {
        let bus = EventBus::build(None);
        let weak = bus.downgrade();
        assert!(weak.upgrade().is_some());
        drop(bus);
        assert!(weak.upgrade().is_none());
    }
}
