//! Listener registry shared by the collaborator implementations.
//!
//! Every change notification in this crate (settings keys, display topology,
//! backlight level, slider edits) is a `Callbacks<T>` on the emitting side and
//! a [`CallbackId`] on the subscribing side. The controller keeps its ids in a
//! registration table and hands each one back on disable.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle for a registered listener, used to disconnect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

impl CallbackId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Listener<T: ?Sized> {
    id: CallbackId,
    callback: Rc<dyn Fn(&T)>,
}

/// A list of listeners notified synchronously, in registration order.
pub struct Callbacks<T: ?Sized> {
    listeners: RefCell<Vec<Listener<T>>>,
}

impl<T: ?Sized> Callbacks<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Register `callback` and return its id.
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&T) + 'static,
    {
        let id = CallbackId::next();
        self.listeners.borrow_mut().push(Listener {
            id,
            callback: Rc::new(callback),
        });
        id
    }

    /// Remove the listener registered under `id`.
    ///
    /// Returns `false` if no such listener exists.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() < before
    }

    /// Invoke every listener with `value`.
    ///
    /// The list is cloned up front so listeners may connect, disconnect or
    /// re-enter the emitter. A listener removed during this pass is still
    /// invoked once; receivers must check their own liveness.
    pub fn notify(&self, value: &T) {
        let pending: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .map(|listener| listener.callback.clone())
            .collect();
        for callback in pending {
            callback(value);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

impl<T: ?Sized> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_register_and_notify_in_order() {
        let callbacks: Callbacks<i32> = Callbacks::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_a = seen.clone();
        callbacks.register(move |value| seen_a.borrow_mut().push(("a", *value)));
        let seen_b = seen.clone();
        callbacks.register(move |value| seen_b.borrow_mut().push(("b", *value)));

        callbacks.notify(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unregister() {
        let callbacks: Callbacks<()> = Callbacks::new();
        let hits = Rc::new(Cell::new(0));

        let hits_clone = hits.clone();
        let id = callbacks.register(move |_| hits_clone.set(hits_clone.get() + 1));
        assert_eq!(callbacks.len(), 1);

        callbacks.notify(&());
        assert!(callbacks.unregister(id));
        assert!(callbacks.is_empty());
        callbacks.notify(&());
        assert_eq!(hits.get(), 1);

        assert!(!callbacks.unregister(id));
    }

    #[test]
    fn test_listener_removed_mid_notify_still_runs_once() {
        let callbacks: Rc<Callbacks<()>> = Rc::new(Callbacks::new());
        let second_id = Rc::new(Cell::new(None));
        let second_hits = Rc::new(Cell::new(0));

        let registry = Rc::downgrade(&callbacks);
        let second_id_clone = second_id.clone();
        callbacks.register(move |_| {
            if let (Some(registry), Some(id)) = (registry.upgrade(), second_id_clone.get()) {
                registry.unregister(id);
            }
        });
        let hits = second_hits.clone();
        second_id.set(Some(callbacks.register(move |_| hits.set(hits.get() + 1))));

        callbacks.notify(&());
        assert_eq!(second_hits.get(), 1);
        assert_eq!(callbacks.len(), 1);

        callbacks.notify(&());
        assert_eq!(second_hits.get(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = CallbackId::next();
        let b = CallbackId::next();
        assert_ne!(a, b);
    }
}
