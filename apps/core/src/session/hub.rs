//! Routes inbound analysis events to per-session listeners.
//!
//! A listener exists exactly as long as its [`SessionSubscription`]; dropping
//! the guard unregisters it, so every exit path of a consumer releases it.
//! Closing the hub ends every subscription's stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::events::AnalysisEvent;

#[derive(Default)]
struct HubInner {
    listeners: HashMap<String, Vec<(u64, mpsc::UnboundedSender<AnalysisEvent>)>>,
    next_id: u64,
    closed: bool,
}

/// Shared event registry. Clones refer to the same registry.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    // The map stays consistent even if a holder panicked.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for events carrying `session_id`.
    pub fn subscribe(&self, session_id: &str) -> SessionSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        if inner.closed {
            // Dropping the sender makes `recv` return `None` right away.
            debug!(session_id, "Subscribed to a closed hub");
        } else {
            inner
                .listeners
                .entry(session_id.to_string())
                .or_default()
                .push((id, sender));
            debug!(session_id, listener = id, "Subscribed to analysis events");
        }

        SessionSubscription {
            session_id: session_id.to_string(),
            id,
            receiver,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `event` to every listener of its session. Returns how many
    /// listeners received it.
    pub fn publish(&self, event: AnalysisEvent) -> usize {
        let mut inner = lock(&self.inner);
        let Some(listeners) = inner.listeners.get_mut(event.session_id()) else {
            trace!(
                event = event.name(),
                session_id = event.session_id(),
                "No listener for event"
            );
            return 0;
        };
        listeners.retain(|(_, sender)| sender.send(event.clone()).is_ok());
        let delivered = listeners.len();
        if delivered == 0 {
            inner.listeners.remove(event.session_id());
        }
        delivered
    }

    /// Drops every listener's sender so pending and future `recv` calls return
    /// `None`. Called when the event source is gone.
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        let released: usize = inner.listeners.drain().map(|(_, l)| l.len()).sum();
        debug!(released, "Event hub closed");
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn listener_count(&self, session_id: &str) -> usize {
        lock(&self.inner)
            .listeners
            .get(session_id)
            .map_or(0, Vec::len)
    }

    pub fn total_listeners(&self) -> usize {
        lock(&self.inner).listeners.values().map(Vec::len).sum()
    }
}

/// A live registration for one session's events.
pub struct SessionSubscription {
    session_id: String,
    id: u64,
    receiver: mpsc::UnboundedReceiver<AnalysisEvent>,
    hub: Weak<Mutex<HubInner>>,
}

impl SessionSubscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event for this session; `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<AnalysisEvent> {
        self.receiver.recv().await
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut inner = lock(&hub);
        if let Some(listeners) = inner.listeners.get_mut(&self.session_id) {
            listeners.retain(|(id, _)| *id != self.id);
            if listeners.is_empty() {
                inner.listeners.remove(&self.session_id);
            }
        }
        debug!(
            session_id = %self.session_id,
            listener = self.id,
            "Unsubscribed from analysis events"
        );
    }
}
