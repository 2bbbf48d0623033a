//! Minimal typed publish/subscribe channel.
//!
//! [`Signal`] keeps its listener list behind a [`Mutex`] so listeners can be
//! added or removed through `&self`, including from inside a handler while
//! a dispatch is running.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Handle returned by [`Signal::listen`], used to unregister the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A typed notification channel.
pub struct Signal<T> {
    listeners: Mutex<Vec<(ListenerId, Handler<T>)>>,
    next_id: AtomicU64,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a handler called on every dispatch, in registration order.
    pub fn listen<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    /// Calls every registered handler with `data`.
    ///
    /// Handlers are snapshotted before the first call, so a handler that
    /// registers or removes listeners affects the next dispatch only.
    pub fn dispatch(&self, data: &T) {
        let handlers: Vec<Handler<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(data);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
