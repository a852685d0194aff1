//! Connection listeners
//!
//! Listeners are called in registration order from a snapshot taken outside
//! the lock, so a listener may add or remove listeners (or call back into the
//! manager) without deadlocking. A panicking listener is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::ssh::SshError;

/// Observer for connection state transitions
pub trait ConnectionListener: Send + Sync {
    /// `error` is set only when the transition was caused by a transport error
    fn on_connection_change(&self, connected: bool, error: Option<&SshError>);
}

impl<F> ConnectionListener for F
where
    F: Fn(bool, Option<&SshError>) + Send + Sync,
{
    fn on_connection_change(&self, connected: bool, error: Option<&SshError>) {
        self(connected, error)
    }
}

/// Ordered set of registered listeners
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<(u64, Arc<dyn ConnectionListener>)>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; the returned remover detaches exactly this registration
    pub fn add(self: &Arc<Self>, listener: Arc<dyn ConnectionListener>) -> ListenerRemover {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        debug!("Connection listener {} registered", id);
        ListenerRemover {
            set: Arc::downgrade(self),
            id,
        }
    }

    /// Remove every registration of `listener` (compared by identity)
    pub fn remove(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(_, l)| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
        listeners.len() != before
    }

    fn remove_id(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Call every listener in registration order
    pub fn notify(&self, connected: bool, error: Option<&SshError>) {
        let snapshot: Vec<(u64, Arc<dyn ConnectionListener>)> = self.listeners.lock().clone();

        for (id, listener) in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| {
                listener.on_connection_change(connected, error)
            }));
            if let Err(payload) = result {
                error!(
                    "Connection listener {} panicked (connected={}): {}",
                    id,
                    connected,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Handle returned at registration time
///
/// Holds only a weak reference, so keeping it around does not keep the
/// manager's listener set alive.
#[derive(Debug, Clone)]
pub struct ListenerRemover {
    set: Weak<ListenerSet>,
    id: u64,
}

impl ListenerRemover {
    /// Detach the listener. Returns false if it was already removed.
    pub fn remove(&self) -> bool {
        match self.set.upgrade() {
            Some(set) => set.remove_id(self.id),
            None => false,
        }
    }
}
