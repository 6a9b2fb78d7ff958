//! The observable event surface exposed to the host application.
//!
//! Events fire synchronously at the moment of the corresponding state
//! transition, so the host's UI reflects connection state without
//! added latency.

use parking_lot::RwLock;
use std::sync::Arc;

/// Connection status as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Streams are being opened.
    Connecting,
    /// The operations stream has produced its first batch.
    Connected,
    /// The connection was torn down.
    Disconnected,
}

/// An event emitted by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Connection status changed.
    Status(ConnectionStatus),
    /// Sync state changed (true once caught up to the live edge).
    Sync(bool),
    /// Alias of [`ProviderEvent::Sync`], kept for caller compatibility;
    /// always fires alongside it.
    Synced(bool),
    /// The underlying streams were closed.
    ConnectionClose,
}

/// Observer of provider events.
///
/// Observers are invoked synchronously and in registration order at
/// each state transition; there is no batching or debouncing.
pub trait ProviderObserver: Send {
    /// Called for every emitted event.
    fn on_event(&mut self, event: &ProviderEvent);
}

impl<F: FnMut(&ProviderEvent) + Send> ProviderObserver for F {
    fn on_event(&mut self, event: &ProviderEvent) {
        self(event)
    }
}

/// A shared, cloneable observer that records every event.
///
/// Hosts can poll it instead of implementing a bespoke observer; tests
/// assert on the recorded sequence.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<ProviderEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in emission order.
    pub fn events(&self) -> Vec<ProviderEvent> {
        self.events.read().clone()
    }

    /// The recorded status transitions only.
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                ProviderEvent::Status(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Drains and returns the recorded events.
    pub fn take(&self) -> Vec<ProviderEvent> {
        std::mem::take(&mut *self.events.write())
    }
}

impl ProviderObserver for EventLog {
    fn on_event(&mut self, event: &ProviderEvent) {
        self.events.write().push(event.clone());
    }
}
