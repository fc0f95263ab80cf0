//! Fan-out of [`ProgressEvent`]s to any number of observers.
//!
//! Each observer owns an unbounded queue, so a slow observer never blocks the
//! pipeline or other observers.  Dropping an [`EventSubscription`] removes it
//! from the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use crate::lock;

use super::progress::ProgressEvent;

pub type ObserverId = u64;

#[derive(Default)]
struct Observers {
    next_id: ObserverId,
    senders: HashMap<ObserverId, mpsc::UnboundedSender<ProgressEvent>>,
}

/// Registry of live observer queues.
#[derive(Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Observers>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer.  It receives every event broadcast from now on.
    pub fn subscribe(&self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut observers = lock(&self.inner);
        observers.next_id += 1;
        let id = observers.next_id;
        observers.senders.insert(id, tx);
        log::debug!("pipeline: observer {id} subscribed ({} total)", observers.senders.len());

        EventSubscription {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove an observer.  Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        remove_observer(&self.inner, id)
    }

    /// Deliver `event` to every observer; returns how many accepted it.
    ///
    /// Observers whose receiver is gone are pruned.
    pub fn broadcast(&self, event: &ProgressEvent) -> usize {
        let mut observers = lock(&self.inner);
        observers
            .senders
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        observers.senders.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_observer(inner: &Mutex<Observers>, id: ObserverId) -> bool {
    let removed = lock(inner).senders.remove(&id).is_some();
    if removed {
        log::debug!("pipeline: observer {id} unsubscribed");
    }
    removed
}

// ---------------------------------------------------------------------------
// EventSubscription
// ---------------------------------------------------------------------------

/// Receiving end of one observer queue.
pub struct EventSubscription {
    id: ObserverId,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    registry: Weak<Mutex<Observers>>,
}

impl EventSubscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next event.  Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            remove_observer(&inner, self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
