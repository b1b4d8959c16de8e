//! Relay Chat Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other Relay Chat crates:
//! - Application configuration (relay address, timeouts, reconnect policy, echo policy)
//! - Global error type covering connection, session and configuration failures
//! - Structured logging with tracing
//! - Config and data directory lookup
//! - Common constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod paths;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, EchoPolicy};
pub use error::{RcError, RcResult};
pub use logging::init_logging;
