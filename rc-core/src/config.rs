//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration: the
//! relay address, connection timeouts, reconnect backoff, echo handling and
//! logging. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{RcError, RcResult};
use crate::paths;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relay connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Reconnect backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Chat session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Terminal display settings.
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Relay connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Relay endpoint (e.g., "ws://localhost:8080").
    #[serde(default = "default_address")]
    pub address: String,

    /// Bounded wait for the transport handshake in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Bounded wait for the relay to confirm a graceful close in milliseconds.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,

    /// Bounded wait for the transport to accept one outbound frame in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Cap for the exponential backoff in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Fraction (0.0 to 1.0) of each delay added as random jitter.
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,

    /// Maximum number of consecutive retries (0 = unlimited).
    #[serde(default)]
    pub max_attempts: u32,
}

/// What to do with inbound frames that repeat a message this client sent.
///
/// Relays that broadcast to every peer, the sender included, deliver each
/// local message a second time. No message ids exist on the wire, so the
/// only available correlation is the text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EchoPolicy {
    /// Append every inbound frame as a remote entry.
    #[default]
    KeepAll,
    /// Drop the first inbound frame whose text equals a message sent on the
    /// current connection that has not been matched yet.
    SuppressOwn,
}

impl EchoPolicy {
    /// Parse a policy name as written in config files and on the command line.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep-all" | "keep_all" | "keep" => Some(Self::KeepAll),
            "suppress-own" | "suppress_own" | "suppress" => Some(Self::SuppressOwn),
            _ => None,
        }
    }

    /// Name as written in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeepAll => "keep-all",
            Self::SuppressOwn => "suppress-own",
        }
    }
}

impl std::fmt::Display for EchoPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Handling of inbound copies of our own messages.
    #[serde(default)]
    pub echo_policy: EchoPolicy,

    /// Capacity of the session event channel for UI subscribers.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Terminal display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Label shown next to local messages.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Prefix each printed entry with its local time.
    #[serde(default)]
    pub show_timestamps: bool,
}

// Default value functions for serde

fn default_address() -> String {
    constants::DEFAULT_RELAY_ADDRESS.to_string()
}

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_close_timeout() -> u64 {
    constants::DEFAULT_CLOSE_TIMEOUT_MS
}

fn default_send_timeout() -> u64 {
    constants::DEFAULT_SEND_TIMEOUT_MS
}

fn default_base_delay() -> u64 {
    constants::DEFAULT_RECONNECT_BASE_MS
}

fn default_max_delay() -> u64 {
    constants::DEFAULT_RECONNECT_MAX_MS
}

fn default_jitter() -> f64 {
    constants::DEFAULT_RECONNECT_JITTER
}

fn default_event_capacity() -> usize {
    constants::DEFAULT_EVENT_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_user_name() -> String {
    "You".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            connect_timeout_ms: default_connect_timeout(),
            close_timeout_ms: default_close_timeout(),
            send_timeout_ms: default_send_timeout(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_factor: default_jitter(),
            max_attempts: 0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            echo_policy: EchoPolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            show_timestamps: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> RcResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> RcResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&contents)?;
        config.server.address = Self::sanitize_server_address(&config.server.address);
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> RcResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RcError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> RcResult<PathBuf> {
        Ok(paths::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> RcResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(paths::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> RcResult<()> {
        if self.server.address.is_empty() {
            return Err(RcError::MissingConfig("server.address".into()));
        }
        if self.server.connect_timeout_ms == 0 {
            return Err(RcError::Config("server.connect_timeout_ms must be positive".into()));
        }
        if self.server.send_timeout_ms == 0 {
            return Err(RcError::Config("server.send_timeout_ms must be positive".into()));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(RcError::Config(
                "reconnect.base_delay_ms must not exceed reconnect.max_delay_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter_factor) {
            return Err(RcError::Config("reconnect.jitter_factor must be within 0.0..=1.0".into()));
        }
        if self.session.event_capacity == 0 {
            return Err(RcError::Config("session.event_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Sanitize and normalize a relay address.
    ///
    /// Ensures the address has a WebSocket scheme (`http` maps to `ws`,
    /// `https` to `wss`, no scheme to `ws`) and strips trailing slashes.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
            trimmed.to_string()
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}
