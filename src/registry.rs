//! Ordered subscriber registries with per-registration cancellation.
//!
//! Each [`Listener`](crate::listener::Listener),
//! [`Connection`](crate::connection::Connection) and
//! [`Bridge`](crate::bridge::Bridge) owns its own registries. Adding a
//! subscriber returns a [`Subscription`] that removes exactly that
//! registration; dropping the subscription leaves it in place.
//!
//! Iteration works on a snapshot, so subscribers may add or cancel
//! registrations from inside a callback without deadlocking.

use std::{
    fmt,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

struct Entries<T: ?Sized> {
    next_id: AtomicU64,
    items: Mutex<Vec<(u64, Arc<T>)>>,
}

/// Insertion-ordered list of subscribers.
pub struct Registry<T: ?Sized> {
    entries: Arc<Entries<T>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Entries {
                next_id: AtomicU64::new(0),
                items: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Registry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `item` and return the handle that removes it again.
    pub fn add(&self, item: Arc<T>) -> Subscription {
        let id = self.entries.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.items.lock().push((id, item));
        let entries: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(entries) = entries.upgrade() {
                    entries.items.lock().retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Copy the current subscribers in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .items
            .lock()
            .iter()
            .map(|(_, item)| Arc::clone(item))
            .collect()
    }

    /// Call `f` for every subscriber present when the visit began.
    pub fn visit(&self, mut f: impl FnMut(&T)) {
        for item in self.snapshot() {
            f(&item);
        }
    }
}

impl<T: ?Sized> Registry<T> {
    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.items.lock().len() }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Handle for one registration in a [`Registry`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the registration. Idempotent with respect to the registry: a
    /// registry that has since been dropped is left alone.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn visits_in_registration_order() {
        let registry: Registry<str> = Registry::new();
        let _a = registry.add(Arc::from("a"));
        let _b = registry.add(Arc::from("b"));
        let mut seen = Vec::new();
        registry.visit(|item| seen.push(item.to_owned()));
        assert_eq!(seen, ["a", "b"]);
    }

    #[test]
    fn cancel_removes_only_its_registration() {
        let registry: Registry<str> = Registry::new();
        let a = registry.add(Arc::from("same"));
        let _b = registry.add(Arc::from("same"));
        a.cancel();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dropping_subscription_keeps_registration() {
        let registry: Registry<str> = Registry::new();
        drop(registry.add(Arc::from("kept")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn subscribers_may_cancel_during_visit() {
        type Callback = dyn Fn() + Send + Sync;
        let registry: Registry<Callback> = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let self_slot = Arc::clone(&slot);
        let counter = Arc::clone(&calls);
        let sub = registry.add(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = self_slot.lock().take() {
                sub.cancel();
            }
        }));
        *slot.lock() = Some(sub);

        registry.visit(|f| f());
        registry.visit(|f| f());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_after_registry_dropped_is_noop() {
        let registry: Registry<str> = Registry::new();
        let sub = registry.add(Arc::from("x"));
        drop(registry);
        sub.cancel();
    }
}
