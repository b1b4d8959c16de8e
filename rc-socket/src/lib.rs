//! RelayChat socket layer.
//!
//! This crate provides the connection manager that handles:
//! - One logical connection to a relay over a pluggable transport
//! - The connection state machine and its transition table
//! - Automatic reconnection with exponential backoff and jitter
//! - Ordered fan-out of state changes and inbound frames to subscribers
//! - WebSocket transport via tokio-tungstenite

pub mod events;
pub mod frame;
pub mod manager;
pub mod transport;
pub mod websocket;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export key types
pub use events::{ConnectionEvent, ConnectionState, EventDispatcher, FailureKind};
pub use frame::OutboundMessage;
pub use manager::{ConnectionManager, ConnectionOptions, ReconnectPolicy};
pub use transport::{Connector, FrameSink, FrameSource, TransportEvent, TransportPair};
pub use websocket::WebSocketConnector;
