//! Observer registry for progress events.
//!
//! Handlers run synchronously on the publishing task, in registration
//! order. The handler list is snapshotted before dispatch, so handlers may
//! subscribe or unsubscribe (themselves included) while an event is being
//! delivered.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::ProgressUpdate;

/// A subscriber callback.
pub type EventHandler = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, EventHandler)>,
}

/// Fan-out point for one event stream.
#[derive(Default)]
pub struct EventHub {
    registry: Mutex<Registry>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler. Dropping the returned subscription unregisters it.
    pub fn subscribe(self: &Arc<Self>, handler: EventHandler) -> Subscription {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.push((id, handler));
        Subscription {
            hub: Arc::downgrade(self),
            id,
        }
    }

    /// Deliver an update to every current handler; returns how many ran to completion.
    ///
    /// A panicking handler is logged and skipped.
    pub fn publish(&self, update: &ProgressUpdate) -> usize {
        let snapshot: Vec<EventHandler> = self
            .registry()
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(update))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!("Progress handler panicked on {}", update.description());
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().handlers.len()
    }

    /// Drop every handler.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut self.registry().handlers);
        drop(removed);
    }

    // Removed handlers are dropped after the lock is released: a handler may
    // own a Subscription whose drop re-enters the registry.
    fn remove(&self, id: u64) {
        let removed = {
            let mut registry = self.registry();
            registry
                .handlers
                .iter()
                .position(|(handler_id, _)| *handler_id == id)
                .map(|index| registry.handlers.remove(index))
        };
        drop(removed);
    }
}

/// Handle returned by [`EventHub::subscribe`].
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    hub: Weak<EventHub>,
    id: u64,
}

impl Subscription {
    /// Unregister the handler. Safe to call repeatedly and during dispatch.
    pub fn unsubscribe(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::JobStatus;

    fn update(progress: u8) -> ProgressUpdate {
        ProgressUpdate::new("job-1", JobStatus::Running, progress)
    }

    #[test]
    fn delivers_in_order_to_every_handler() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        let _a = hub.subscribe(Arc::new(move |u: &ProgressUpdate| {
            first.lock().unwrap().push(("a", u.progress));
        }));
        let second = seen.clone();
        let _b = hub.subscribe(Arc::new(move |u: &ProgressUpdate| {
            second.lock().unwrap().push(("b", u.progress));
        }));

        hub.publish(&update(10));
        hub.publish(&update(20));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a", 10), ("b", 10), ("a", 20), ("b", 20)]
        );
    }

    fn exploding_handler(_: &ProgressUpdate) {
        panic!("handler bug");
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = hub.subscribe(Arc::new(exploding_handler));
        let counter = count.clone();
        let _good = hub.subscribe(Arc::new(move |_: &ProgressUpdate| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(hub.publish(&update(1)), 1);
        assert_eq!(hub.publish(&update(2)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_drop_unsubscribes() {
        let hub = EventHub::new();
        let sub = hub.subscribe(Arc::new(|_: &ProgressUpdate| {}));
        let other = hub.subscribe(Arc::new(|_: &ProgressUpdate| {}));
        assert_eq!(hub.subscriber_count(), 2);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(other);
        assert_eq!(hub.subscriber_count(), 0);
        drop(sub);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let hub = EventHub::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let own = slot.clone();
        let counter = calls.clone();
        let sub = hub.subscribe(Arc::new(move |_: &ProgressUpdate| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = own.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        }));
        *slot.lock().unwrap() = Some(sub);

        hub.publish(&update(1));
        hub.publish(&update(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_hub_is_harmless() {
        let hub = EventHub::new();
        let sub = hub.subscribe(Arc::new(|_: &ProgressUpdate| {}));
        drop(hub);
        sub.unsubscribe();
    }
}
