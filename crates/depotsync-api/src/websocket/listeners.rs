// Inbound message routing.
//
// Listeners are kept in registration order. Each inbound message is
// tested against every listener independently: an id-keyed listener
// matches only on id, a type-keyed listener only on type, and a
// wildcard listener matches everything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::message::InboundMessage;

/// Callback invoked for every matching inbound message.
///
/// Identity is the `Arc` allocation: removing a handler removes every
/// registration that shares it.
pub type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

struct Entry {
    id: Option<String>,
    kind: Option<String>,
    handler: Handler,
}

impl Entry {
    fn matches(&self, message: &InboundMessage) -> bool {
        if let Some(ref id) = self.id {
            return message.id() == Some(id.as_str());
        }
        if let Some(ref kind) = self.kind {
            return message.kind() == Some(kind.as_str());
        }
        true
    }
}

/// Ordered set of listeners shared by every connection of a socket handle.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages with the given `id`, or `kind`, or
    /// (if both are `None`) for every message. Returns the handler so the
    /// caller can remove it later.
    pub fn add_listener(
        &self,
        id: Option<String>,
        kind: Option<String>,
        handler: Handler,
    ) -> Handler {
        self.lock().push(Entry {
            id,
            kind,
            handler: Arc::clone(&handler),
        });
        handler
    }

    /// Remove every registration of `handler`. Returns how many were removed.
    pub fn remove_listener(&self, handler: &Handler) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| !Arc::ptr_eq(&entry.handler, handler));
        before - entries.len()
    }

    /// Drop all listeners.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Parse a raw text frame and dispatch it. Malformed frames are logged
    /// and dropped; returns the number of handlers invoked.
    pub fn dispatch_text(&self, text: &str) -> usize {
        match InboundMessage::parse(text) {
            Ok(message) => self.dispatch(&message),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed inbound message");
                0
            }
        }
    }

    /// Invoke every matching handler, in registration order.
    ///
    /// Handlers run outside the lock, so they may add or remove listeners.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let matched: Vec<Handler> = self
            .lock()
            .iter()
            .filter(|entry| entry.matches(message))
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        if matched.is_empty() {
            tracing::trace!(id = ?message.id(), kind = ?message.kind(), "no listener for message");
        }

        for handler in &matched {
            handler(message);
        }
        matched.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
