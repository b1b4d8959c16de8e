//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rc_core::EchoPolicy;
use rc_session::{ChatSession, SessionOptions};
use rc_socket::testing::{MemoryConnector, PeerQueue};
use rc_socket::{ConnectionOptions, ConnectionState, ReconnectPolicy};

/// Base delay used by every test session.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Deterministic options: no jitter, unlimited retries.
pub fn test_options(echo_policy: EchoPolicy) -> SessionOptions {
    SessionOptions {
        connection: ConnectionOptions::default().with_reconnect_policy(ReconnectPolicy {
            base_delay: BASE_DELAY,
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.0,
            max_attempts: 0,
        }),
        echo_policy,
        event_capacity: 64,
    }
}

/// Same as `test_options` with delays short enough for real sockets.
pub fn fast_options(echo_policy: EchoPolicy) -> SessionOptions {
    let mut options = test_options(echo_policy);
    options.connection.reconnect.base_delay = Duration::from_millis(50);
    options.connection.reconnect.max_delay = Duration::from_millis(200);
    options
}

/// Route warnings from the crates under test to stderr.
pub fn init_test_logging() {
    rc_core::logging::init_console_logging("warn");
}

/// Create a session over an in-memory transport.
pub fn memory_session(echo_policy: EchoPolicy) -> (ChatSession, Arc<MemoryConnector>, PeerQueue) {
    init_test_logging();
    let (connector, peers) = MemoryConnector::new();
    let session = ChatSession::with_connector(
        "mem://relay",
        connector.clone(),
        test_options(echo_policy),
    );
    (session, connector, peers)
}

/// Apply events until the session reports `want`.
pub async fn wait_for_status(session: &mut ChatSession, want: ConnectionState) {
    let waited = tokio::time::timeout(Duration::from_secs(60), async {
        while session.current_status() != want {
            assert!(session.process_next().await, "event channel closed");
        }
    })
    .await;
    assert!(waited.is_ok(), "status never became {want}");
}

/// Apply events until the log holds `len` entries.
pub async fn wait_for_log_len(session: &mut ChatSession, len: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(60), async {
        while session.current_log().len() < len {
            assert!(session.process_next().await, "event channel closed");
        }
    })
    .await;
    assert!(waited.is_ok(), "log never reached {len} entries");
}

/// Log as `(text, origin)` pairs.
pub fn log_texts(session: &ChatSession) -> Vec<(String, rc_session::Origin)> {
    session
        .current_log()
        .iter()
        .map(|e| (e.text.clone(), e.origin))
        .collect()
}
