//! Connection states, connection events and the event dispatcher.
//!
//! Every state transition, inbound frame and failure is delivered to each
//! subscriber through its own unbounded channel, in the order the driver
//! produced them. A slow subscriber therefore never loses an intermediate
//! state, unlike a broadcast channel that reports lag.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

/// Connection state owned by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Transport handshake in progress.
    Connecting,
    /// Connected; frames flow both ways.
    Open,
    /// Graceful close requested, waiting for the peer to confirm.
    Closing,
    /// The last attempt or connection failed; a retry may be scheduled.
    Failed,
}

impl ConnectionState {
    /// The transition table. Anything not listed here is illegal.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Disconnected, Connecting) => true,
            (Connecting, Open) => true,
            (Connecting, Failed) => true,
            (Connecting, Disconnected) => true,
            (Open, Closing) => true,
            (Open, Failed) => true,
            (Closing, Disconnected) => true,
            (Failed, Connecting) => true,
            (Failed, Disconnected) => true,
            (Disconnected, _) | (Connecting, _) | (Open, _) | (Closing, _) | (Failed, _) => false,
        }
    }

    /// Whether `start` may begin a new attempt from this state.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why the connection entered `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The handshake was refused or errored.
    ConnectError(String),
    /// The handshake did not complete within the configured bound.
    ConnectTimeout(Duration),
    /// The peer or the network closed an open channel.
    TransportClosed(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectError(reason) => write!(f, "connect error: {reason}"),
            Self::ConnectTimeout(after) => write!(f, "connect timed out after {after:?}"),
            Self::TransportClosed(reason) => write!(f, "transport closed: {reason}"),
        }
    }
}

/// Event emitted by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The state machine moved from `previous` to `current`.
    StateChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },
    /// One inbound text frame.
    Frame(String),
    /// Detail for the transition into `Failed` emitted just before.
    Failed(FailureKind),
    /// A retry will move `Failed` to `Connecting` after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
    /// A frame could not be handed to the transport.
    SendFailed { payload: String, reason: String },
}

impl ConnectionEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state-changed",
            Self::Frame(_) => "frame",
            Self::Failed(_) => "failed",
            Self::RetryScheduled { .. } => "retry-scheduled",
            Self::SendFailed { .. } => "send-failed",
        }
    }
}

/// Fan-out dispatcher with one unbounded channel per subscriber.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event dispatched from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Dispatch an event to all live subscribers, forgetting dropped ones.
    pub fn dispatch(&self, event: ConnectionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(
            "dispatched {} to {} subscriber(s)",
            event.kind(),
            subscribers.len()
        );
    }

    /// Get the current number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ConnectionState; 5] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Open,
        ConnectionState::Closing,
        ConnectionState::Failed,
    ];

    #[test]
    fn test_transition_table() {
        use ConnectionState::*;
        let legal = [
            (Disconnected, Connecting),
            (Connecting, Open),
            (Connecting, Failed),
            (Connecting, Disconnected),
            (Open, Closing),
            (Open, Failed),
            (Closing, Disconnected),
            (Failed, Connecting),
            (Failed, Disconnected),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_disconnected_has_no_automatic_exit_besides_start() {
        use ConnectionState::*;
        let exits: Vec<_> = ALL
            .into_iter()
            .filter(|to| Disconnected.can_transition_to(*to))
            .collect();
        assert_eq!(exits, vec![Connecting]);
    }

    #[test]
    fn test_can_start() {
        assert!(ConnectionState::Disconnected.can_start());
        assert!(ConnectionState::Failed.can_start());
        assert!(!ConnectionState::Connecting.can_start());
        assert!(!ConnectionState::Open.can_start());
        assert!(!ConnectionState::Closing.can_start());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }

    #[test]
    fn test_failure_kind_display() {
        let kind = FailureKind::ConnectTimeout(Duration::from_millis(1500));
        assert_eq!(kind.to_string(), "connect timed out after 1.5s");
    }

    #[tokio::test]
    async fn test_dispatcher_preserves_order_per_subscriber() {
        let dispatcher = EventDispatcher::new();
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();

        for i in 0..500 {
            dispatcher.dispatch(ConnectionEvent::Frame(i.to_string()));
        }

        for i in 0..500 {
            assert_eq!(first.recv().await, Some(ConnectionEvent::Frame(i.to_string())));
            assert_eq!(second.recv().await, Some(ConnectionEvent::Frame(i.to_string())));
        }
    }

    #[test]
    fn test_dispatcher_drops_closed_subscribers() {
        let dispatcher = EventDispatcher::new();
        let kept = dispatcher.subscribe();
        let dropped = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 2);

        drop(dropped);
        dispatcher.dispatch(ConnectionEvent::Frame("x".into()));
        assert_eq!(dispatcher.subscriber_count(), 1);
        drop(kept);
    }
}
