//! Transport seam between the connection manager and the wire.
//!
//! A `Connector` performs the handshake and hands back the two halves of an
//! open channel. The manager owns both halves exclusively and drops them to
//! release the socket.

use async_trait::async_trait;

use rc_core::error::RcResult;

/// What the read half reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound frame, already decoded as text.
    Frame(String),
    /// The peer completed a close handshake or the stream ended.
    Closed,
    /// The channel broke.
    Error(String),
}

/// Write half of an open channel.
#[async_trait]
pub trait FrameSink: Send {
    /// Hand one text frame to the transport.
    async fn send_text(&mut self, text: &str) -> RcResult<()>;

    /// Start a graceful close. Confirmation arrives on the read half.
    async fn close(&mut self) -> RcResult<()>;
}

/// Read half of an open channel.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next event. Must be cancel safe.
    async fn next_event(&mut self) -> TransportEvent;
}

/// Both halves of a freshly opened channel.
pub struct TransportPair {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens channels to an address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Perform the handshake. The caller bounds the wait.
    async fn connect(&self, address: &str) -> RcResult<TransportPair>;
}
