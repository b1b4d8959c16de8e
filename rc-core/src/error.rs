//! Global error types for Relay Chat.
//!
//! Every failure a caller can observe is a variant of `RcError`. Connection
//! failures (`Connect`, `ConnectTimeout`, `TransportClosed`) are normally
//! recovered by the reconnect loop and only reach callers through events;
//! `NotConnected`, `SendFailed` and `EmptyMessage` are returned directly from
//! the operation that was rejected.

use std::time::Duration;

use thiserror::Error;

/// Convenience type alias for Results using RcError.
pub type RcResult<T> = Result<T, RcError>;

/// Unified error type for Relay Chat.
#[derive(Error, Debug)]
pub enum RcError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// The relay address cannot be used as a transport endpoint.
    #[error("invalid relay address: {0}")]
    InvalidAddress(String),

    // -- Connection errors --
    /// The transport handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The transport handshake did not finish within the configured bound.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The peer or the network closed the channel.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// An operation that needs an open connection was attempted without one.
    #[error("not connected")]
    NotConnected,

    /// A frame could not be handed to the transport.
    #[error("send failed: {0}")]
    SendFailed(String),

    // -- Message errors --
    /// The submitted text is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    // -- File/IO errors --
    /// File system or socket operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RcError {
    /// Whether the reconnect loop recovers from this error on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::ConnectTimeout(_) | Self::TransportClosed(_)
        )
    }
}

impl From<serde_json::Error> for RcError {
    fn from(e: serde_json::Error) -> Self {
        RcError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RcError {
    fn from(e: toml::de::Error) -> Self {
        RcError::Config(e.to_string())
    }
}
