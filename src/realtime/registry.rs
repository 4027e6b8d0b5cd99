//! Subscription registry.
//!
//! Maps each event kind to an ordered list of callbacks. Handlers are invoked
//! in registration order; a handler that fails or panics is logged and the
//! remaining handlers still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::warn;

use super::events::{EventKind, ServerEvent};

pub type EventCallback = Arc<dyn Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync>;

/// Identity of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    callback: EventCallback,
}

type Entries = Mutex<HashMap<EventKind, Vec<Entry>>>;

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct SubscriptionRegistry {
    entries: Arc<Entries>,
    next_id: AtomicU64,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for `kind`.
    ///
    /// The same closure may be registered several times; each call yields a
    /// separate registration with its own handle.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_shared(kind, Arc::new(callback))
    }

    pub fn subscribe_shared(&self, kind: EventKind, callback: EventCallback) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Entry { id, callback });

        Subscription {
            kind,
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Invoke every callback currently registered for the event's kind.
    pub fn dispatch(&self, event: &ServerEvent) -> DispatchReport {
        let kind = event.kind();
        // Snapshot so callbacks can (un)subscribe without deadlocking.
        let callbacks: Vec<(SubscriptionId, EventCallback)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| {
                list.iter()
                    .map(|e| (e.id, Arc::clone(&e.callback)))
                    .collect()
            })
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        "Handler {:?} for '{}' failed: {:#}",
                        id,
                        kind.as_str(),
                        e
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    warn!("Handler {:?} for '{}' panicked", id, kind.as_str());
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the callback registered; call `unsubscribe`.
#[derive(Debug, Clone)]
pub struct Subscription {
    kind: EventKind,
    id: SubscriptionId,
    entries: Weak<Entries>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove exactly this registration. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        let Some(entries) = self.entries.upgrade() else {
            return;
        };
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = entries.get_mut(&self.kind) {
            list.retain(|e| e.id != self.id);
            if list.is_empty() {
                entries.remove(&self.kind);
            }
        }
    }
}
