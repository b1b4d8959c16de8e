//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "RelayChat";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Relay address used when nothing is configured.
pub const DEFAULT_RELAY_ADDRESS: &str = "ws://localhost:8080";

/// Bind address for the development relay.
pub const DEFAULT_RELAY_BIND: &str = "127.0.0.1:8080";

/// Bounded wait for the transport handshake, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Bounded wait for the peer to confirm a graceful close, in milliseconds.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 2_000;

/// Bounded wait for the transport to accept one outbound frame, in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;

/// First reconnect delay, in milliseconds.
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;

/// Reconnect delay cap, in milliseconds.
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

/// Fraction of each reconnect delay that may be added as random jitter.
pub const DEFAULT_RECONNECT_JITTER: f64 = 0.3;

/// Capacity of the session event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Maximum number of sent texts remembered for echo suppression.
pub const MAX_PENDING_ECHOES: usize = 100;

/// Log file name prefix used by the rolling appender.
pub const LOG_FILE_NAME: &str = "relaychat.log";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_defaults_are_ordered() {
        assert!(DEFAULT_RECONNECT_BASE_MS <= DEFAULT_RECONNECT_MAX_MS);
        assert!((0.0..=1.0).contains(&DEFAULT_RECONNECT_JITTER));
    }

    #[test]
    fn test_default_address_scheme() {
        assert!(DEFAULT_RELAY_ADDRESS.starts_with("ws://"));
    }
}
