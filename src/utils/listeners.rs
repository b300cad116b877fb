//! Ordered observer registry with per-listener fault isolation.
//!
//! Listeners are invoked in subscription order from a snapshot taken before
//! notification starts, so a listener may subscribe or unsubscribe (itself or
//! others) without deadlocking. A panicking listener is logged and skipped; the
//! remaining listeners are still notified.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ListenerMap<T> = RwLock<IndexMap<u64, Listener<T>>>;

pub struct ListenerRegistry<T> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: Arc<ListenerMap<T>>,
}

impl<T: 'static> std::fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("name", &self.name)
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T: 'static> ListenerRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Register a listener; drop of the returned handle does not unsubscribe
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, Arc::new(listener));

        let weak: Weak<ListenerMap<T>> = Arc::downgrade(&self.listeners);
        Subscription {
            id,
            remove: Box::new(move |id| {
                weak.upgrade()
                    .map(|listeners| listeners.write().shift_remove(&id).is_some())
                    .unwrap_or(false)
            }),
        }
    }

    /// Notify every listener; returns how many panicked
    pub fn notify(&self, value: &T) -> usize {
        let snapshot: Vec<(u64, Listener<T>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut failures = 0;
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                failures += 1;
                warn!(registry = self.name, listener_id = id, "Listener panicked during notification");
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`]
pub struct Subscription {
    id: u64,
    remove: Box<dyn Fn(u64) -> bool + Send + Sync>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener; returns false if it was already gone
    pub fn unsubscribe(self) -> bool {
        (self.remove)(self.id)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notifies_in_subscription_order() {
        let registry = ListenerRegistry::<u32>::new("test");
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            registry.subscribe(move |value: &u32| seen.lock().push(format!("{tag}:{value}")));
        }

        registry.notify(&7);
        assert_eq!(*seen.lock(), vec!["first:7", "second:7"]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = ListenerRegistry::<()>::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        registry.subscribe(|_| panic!("bad listener"));
        let counter = Arc::clone(&calls);
        registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let failures = registry.notify(&());
        assert_eq!(failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let registry = ListenerRegistry::<()>::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(subscription.unsubscribe());
        registry.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_debug_reports_listener_count() {
        let registry = ListenerRegistry::<String>::new("connectivity");
        registry.subscribe(|_| {});

        let debug = format!("{registry:?}");
        assert!(debug.contains("connectivity"));
        assert!(debug.contains("listeners: 1"));
    }
}
