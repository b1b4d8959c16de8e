//! Session event bus for the presentation layer.
//!
//! Uses a tokio broadcast channel so any number of views can follow one
//! session. The message log stays authoritative: a view that lags can
//! always re-read `current_log()`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use rc_socket::ConnectionState;

use crate::log::ChatEntry;

/// What a session reports to its views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A local or remote entry was appended to the log.
    EntryAppended(ChatEntry),
    /// The mirrored connection status changed.
    StatusChanged(ConnectionState),
    /// The local entry with this sequence could not be transmitted.
    SendFailed { sequence: u64, reason: String },
    /// The connection entered `Failed`.
    ConnectionFailed(String),
    /// A reconnect attempt is scheduled.
    ReconnectScheduled { attempt: u32, delay: Duration },
}

/// Session event bus backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<SessionEvent>>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    ///
    /// Subscribers more than `capacity` events behind receive `Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to receive session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SessionEvent) {
        let label = event_label(&event);
        match self.sender.send(event) {
            Ok(count) => {
                debug!("event_bus: emitted {label} to {count} subscriber(s)");
            }
            Err(_) => {
                debug!("event_bus: no subscribers for {label}");
            }
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Human-readable label for an event (for logging).
fn event_label(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::EntryAppended(_) => "EntryAppended",
        SessionEvent::StatusChanged(_) => "StatusChanged",
        SessionEvent::SendFailed { .. } => "SendFailed",
        SessionEvent::ConnectionFailed(_) => "ConnectionFailed",
        SessionEvent::ReconnectScheduled { .. } => "ReconnectScheduled",
    }
}
