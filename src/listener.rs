//! Listener registry for connection notifications.
//!
//! Three independent observer lists:
//! - event listeners: receive every event decoded in receive-loop mode
//! - raw-message listeners: get first refusal on every received chunk
//! - connection-error listeners: told when the connection fails after connect
//!
//! Listeners are called in registration order. The registry hands out
//! snapshots (`Arc` clones) so callers can invoke listeners without holding
//! any lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::VscpError;
use crate::protocol::Event;

/// Event listener callback.
pub type EventListener = dyn Fn(&Event) + Send + Sync;

/// Raw-message listener callback. Returning `true` marks the chunk as fully
/// handled and skips normal frame/event processing for it.
pub type RawMessageListener = dyn Fn(&[u8]) -> bool + Send + Sync;

/// Connection-error listener callback.
pub type ErrorListener = dyn Fn(&VscpError) + Send + Sync;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered list of listeners of one kind.
pub(crate) struct ListenerList<T: ?Sized> {
    entries: Vec<(ListenerId, Arc<T>)>,
}

impl<T: ?Sized> ListenerList<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, listener: Arc<T>) -> ListenerId {
        let id = ListenerId::next();
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listeners in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.iter().map(|(_, l)| l.clone()).collect()
    }
}

/// All listener lists of one client.
pub(crate) struct Listeners {
    pub events: ListenerList<EventListener>,
    pub raw: ListenerList<RawMessageListener>,
    pub errors: ListenerList<ErrorListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            events: ListenerList::new(),
            raw: ListenerList::new(),
            errors: ListenerList::new(),
        }
    }

    /// Remove a listener from whichever list holds it.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.events.remove(id) || self.raw.remove(id) || self.errors.remove(id)
    }
}
