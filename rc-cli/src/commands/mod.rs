//! CLI command implementations.

pub mod chat;
pub mod relay;
pub mod settings;
pub mod status;

use rc_core::config::AppConfig;

/// Resolve the relay address: argument first, then config.
pub fn resolve_address(config: &AppConfig, address: Option<String>) -> String {
    match address {
        Some(address) => AppConfig::sanitize_server_address(&address),
        None => config.server.address.clone(),
    }
}

/// Truncate a string to a maximum number of characters, appending an
/// ellipsis if truncated.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else if max_chars > 3 {
        let kept: String = s.chars().take(max_chars - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_chars).collect()
    }
}
