//! Chat session.
//!
//! Owns one `ConnectionManager` and the `MessageLog`, and turns connection
//! events into log entries and session events. The session is a plain
//! `&mut self` object: it consumes its event receiver on the caller's task
//! through `drain_events` / `process_next`, so the log is never shared.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rc_core::config::{AppConfig, EchoPolicy};
use rc_core::constants::DEFAULT_EVENT_CAPACITY;
use rc_core::error::{RcError, RcResult};
use rc_socket::{
    ConnectionEvent, ConnectionManager, ConnectionOptions, ConnectionState, Connector,
    OutboundMessage, WebSocketConnector,
};

use crate::echo::EchoFilter;
use crate::event_bus::{EventBus, SessionEvent};
use crate::log::{ChatEntry, MessageLog, Origin};

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connection: ConnectionOptions,
    pub echo_policy: EchoPolicy,
    /// Capacity of the session event bus.
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionOptions::default(),
            echo_policy: EchoPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            connection: ConnectionOptions::from_config(config),
            echo_policy: config.session.echo_policy,
            event_capacity: config.session.event_capacity,
        }
    }

    pub fn with_echo_policy(mut self, policy: EchoPolicy) -> Self {
        self.echo_policy = policy;
        self
    }
}

/// One conversation with one relay.
pub struct ChatSession {
    id: Uuid,
    manager: ConnectionManager,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    log: MessageLog,
    status: ConnectionState,
    echo: EchoFilter,
    bus: EventBus,
}

impl ChatSession {
    /// Create a WebSocket session for `address`. Must be called within a
    /// Tokio runtime. The connection is not started.
    pub fn new(address: impl Into<String>, options: SessionOptions) -> Self {
        Self::with_connector(address, Arc::new(WebSocketConnector::new()), options)
    }

    /// Create a session over a custom transport.
    pub fn with_connector(
        address: impl Into<String>,
        connector: Arc<dyn Connector>,
        options: SessionOptions,
    ) -> Self {
        let manager = ConnectionManager::new(address, connector, options.connection);
        let events = manager.subscribe();
        let id = Uuid::new_v4();
        info!(session = %id, address = manager.address(), echo = %options.echo_policy, "chat session created");

        Self {
            id,
            status: manager.state(),
            manager,
            events,
            log: MessageLog::new(),
            echo: EchoFilter::new(options.echo_policy),
            bus: EventBus::new(options.event_capacity),
        }
    }

    /// Create a WebSocket session from the application config.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.server.address.clone(), SessionOptions::from_config(config))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn address(&self) -> &str {
        self.manager.address()
    }

    pub fn echo_policy(&self) -> EchoPolicy {
        self.echo.policy()
    }

    /// Ask the manager to connect.
    pub fn start(&self) {
        self.manager.start();
    }

    /// Ask the manager to close gracefully and stop retrying.
    pub fn stop(&self) {
        self.manager.stop();
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// The log, in display order.
    pub fn current_log(&self) -> &[ChatEntry] {
        self.log.entries()
    }

    /// Connection status as last applied by this session.
    pub fn current_status(&self) -> ConnectionState {
        self.status
    }

    /// Submit one message.
    ///
    /// Rejects blank input with `EmptyMessage` and anything while not open
    /// with `NotConnected`, appending nothing in either case. Pending `stop`
    /// requests count as not open. Otherwise the local entry is appended
    /// before the frame is sent and stays in the log even when the send
    /// fails.
    pub async fn submit(&mut self, raw: &str) -> RcResult<ChatEntry> {
        let message = OutboundMessage::new(raw)?;

        // Frames that arrived before this submission go first.
        self.drain_events();
        if self.status != ConnectionState::Open {
            debug!(session = %self.id, "submit rejected while {}", self.status);
            return Err(RcError::NotConnected);
        }
        // A stop posted earlier may not have been applied yet.
        let confirmed = self.manager.ensure_open().await;
        self.drain_events();
        if confirmed.is_err() || self.status != ConnectionState::Open {
            debug!(session = %self.id, "submit rejected, connection no longer open");
            return Err(RcError::NotConnected);
        }

        let entry = self.append(message.as_str().to_string(), Origin::Local);
        let text = message.as_str().to_string();

        match self.manager.send(message).await {
            Ok(()) => {
                self.echo.remember(&text);
                Ok(entry)
            }
            Err(e) => {
                let reason = match e {
                    RcError::SendFailed(reason) => reason,
                    other => other.to_string(),
                };
                warn!(session = %self.id, sequence = entry.sequence, "message not delivered: {reason}");
                self.bus.emit(SessionEvent::SendFailed {
                    sequence: entry.sequence,
                    reason: reason.clone(),
                });
                Err(RcError::SendFailed(reason))
            }
        }
    }

    /// Apply every connection event already delivered, without waiting.
    /// Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next connection event and apply it.
    ///
    /// Returns false once no more events can arrive.
    pub async fn process_next(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Close the connection gracefully and tear the session down.
    pub async fn close(mut self) {
        self.manager.shutdown().await;
        self.drain_events();
        info!(session = %self.id, entries = self.log.len(), "chat session closed");
    }

    fn apply(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged { current, .. } => {
                if current != ConnectionState::Open {
                    // Echoes from a previous connection will not arrive.
                    self.echo.clear();
                }
                self.status = current;
                self.bus.emit(SessionEvent::StatusChanged(current));
            }
            ConnectionEvent::Frame(text) => self.on_inbound(text),
            ConnectionEvent::Failed(kind) => {
                self.bus.emit(SessionEvent::ConnectionFailed(kind.to_string()));
            }
            ConnectionEvent::RetryScheduled { attempt, delay } => {
                self.bus
                    .emit(SessionEvent::ReconnectScheduled { attempt, delay });
            }
            ConnectionEvent::SendFailed { .. } => {
                // Already reported by `submit`.
            }
        }
    }

    fn on_inbound(&mut self, text: String) {
        if self.echo.absorb(&text) {
            debug!(session = %self.id, "suppressed echo of own message");
            return;
        }
        self.append(text, Origin::Remote);
    }

    fn append(&mut self, text: String, origin: Origin) -> ChatEntry {
        let entry = self.log.append(text, origin).clone();
        debug!(session = %self.id, sequence = entry.sequence, "appended {origin} entry");
        self.bus.emit(SessionEvent::EntryAppended(entry.clone()));
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.session.echo_policy = EchoPolicy::SuppressOwn;
        config.session.event_capacity = 32;

        let options = SessionOptions::from_config(&config);
        assert_eq!(options.echo_policy, EchoPolicy::SuppressOwn);
        assert_eq!(options.event_capacity, 32);
    }

    #[tokio::test]
    async fn test_new_session_is_disconnected_and_empty() {
        let session = ChatSession::new("ws://127.0.0.1:9", SessionOptions::default());
        assert_eq!(session.current_status(), ConnectionState::Disconnected);
        assert!(session.current_log().is_empty());
        assert_eq!(session.address(), "ws://127.0.0.1:9");
        assert_eq!(session.echo_policy(), EchoPolicy::KeepAll);
    }

    #[tokio::test]
    async fn test_sessions_have_distinct_ids() {
        let a = ChatSession::new("ws://127.0.0.1:9", SessionOptions::default());
        let b = ChatSession::new("ws://127.0.0.1:9", SessionOptions::default());
        assert_ne!(a.id(), b.id());
    }
}
