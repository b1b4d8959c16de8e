//! Settings commands.

use std::path::Path;

use clap::Subcommand;
use console::style;

use rc_core::config::{AppConfig, EchoPolicy};
use rc_core::error::{RcError, RcResult};

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show all settings.
    Show,
    /// Get a specific setting value by key path.
    Get {
        /// Setting key path (e.g., "server.address", "reconnect.base_delay_ms").
        key: String,
    },
    /// Set a specific setting value by key path and save the file.
    Set {
        /// Setting key path (e.g., "server.address", "session.echo_policy").
        key: String,
        /// New value.
        value: String,
    },
    /// Print the configuration file path.
    Path,
    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Resolve a dot-separated key path to a value from the config.
fn get_setting_value(cfg: &AppConfig, key: &str) -> Option<String> {
    match key {
        "server.address" => Some(cfg.server.address.clone()),
        "server.connect_timeout_ms" => Some(cfg.server.connect_timeout_ms.to_string()),
        "server.close_timeout_ms" => Some(cfg.server.close_timeout_ms.to_string()),
        "server.send_timeout_ms" => Some(cfg.server.send_timeout_ms.to_string()),
        "reconnect.base_delay_ms" => Some(cfg.reconnect.base_delay_ms.to_string()),
        "reconnect.max_delay_ms" => Some(cfg.reconnect.max_delay_ms.to_string()),
        "reconnect.jitter_factor" => Some(cfg.reconnect.jitter_factor.to_string()),
        "reconnect.max_attempts" => Some(cfg.reconnect.max_attempts.to_string()),
        "session.echo_policy" => Some(cfg.session.echo_policy.to_string()),
        "session.event_capacity" => Some(cfg.session.event_capacity.to_string()),
        "logging.level" | "log.level" => Some(cfg.logging.level.clone()),
        "logging.directory" => Some(cfg.logging.directory.clone()),
        "logging.json_output" => Some(cfg.logging.json_output.to_string()),
        "display.user_name" => Some(cfg.display.user_name.clone()),
        "display.show_timestamps" => Some(cfg.display.show_timestamps.to_string()),
        _ => None,
    }
}

/// Apply a value to a dot-separated key path on the config.
fn set_setting_value(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), String> {
    match key {
        "server.address" => {
            cfg.server.address = AppConfig::sanitize_server_address(value);
        }
        "server.connect_timeout_ms" => {
            cfg.server.connect_timeout_ms = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "server.close_timeout_ms" => {
            cfg.server.close_timeout_ms = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "server.send_timeout_ms" => {
            cfg.server.send_timeout_ms = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "reconnect.base_delay_ms" => {
            cfg.reconnect.base_delay_ms = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "reconnect.max_delay_ms" => {
            cfg.reconnect.max_delay_ms = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "reconnect.jitter_factor" => {
            cfg.reconnect.jitter_factor = value.parse().map_err(|_| "invalid number".to_string())?;
        }
        "reconnect.max_attempts" => {
            cfg.reconnect.max_attempts = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "session.echo_policy" => {
            cfg.session.echo_policy = EchoPolicy::from_str(value)
                .ok_or_else(|| "expected one of: keep-all, suppress-own".to_string())?;
        }
        "session.event_capacity" => {
            cfg.session.event_capacity = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "logging.level" | "log.level" => {
            let v = value.to_lowercase();
            if !["trace", "debug", "info", "warn", "error"].contains(&v.as_str()) {
                return Err("expected one of: trace, debug, info, warn, error".to_string());
            }
            cfg.logging.level = v;
        }
        "logging.directory" => {
            cfg.logging.directory = value.to_string();
        }
        "logging.json_output" => {
            cfg.logging.json_output = value.parse().map_err(|_| "expected true/false".to_string())?;
        }
        "display.user_name" => {
            cfg.display.user_name = value.to_string();
        }
        "display.show_timestamps" => {
            cfg.display.show_timestamps = value.parse().map_err(|_| "expected true/false".to_string())?;
        }
        _ => {
            return Err(format!("unknown setting key: {key}"));
        }
    }
    // Reject combinations the session could not run with.
    cfg.validate().map_err(|e| e.to_string())
}

fn print_settings_text(cfg: &AppConfig) {
    println!("{}", style("Server").bold().underlined());
    println!("  server.address                {}", cfg.server.address);
    println!("  server.connect_timeout_ms     {}", cfg.server.connect_timeout_ms);
    println!("  server.close_timeout_ms       {}", cfg.server.close_timeout_ms);
    println!("  server.send_timeout_ms        {}", cfg.server.send_timeout_ms);

    println!();
    println!("{}", style("Reconnect").bold().underlined());
    println!("  reconnect.base_delay_ms       {}", cfg.reconnect.base_delay_ms);
    println!("  reconnect.max_delay_ms        {}", cfg.reconnect.max_delay_ms);
    println!("  reconnect.jitter_factor       {}", cfg.reconnect.jitter_factor);
    println!("  reconnect.max_attempts        {}", cfg.reconnect.max_attempts);

    println!();
    println!("{}", style("Session").bold().underlined());
    println!("  session.echo_policy           {}", cfg.session.echo_policy);
    println!("  session.event_capacity        {}", cfg.session.event_capacity);

    println!();
    println!("{}", style("Logging").bold().underlined());
    println!("  logging.level                 {}", cfg.logging.level);
    println!("  logging.directory             {}", cfg.logging.directory);
    println!("  logging.json_output           {}", cfg.logging.json_output);

    println!();
    println!("{}", style("Display").bold().underlined());
    println!("  display.user_name             {}", cfg.display.user_name);
    println!("  display.show_timestamps       {}", cfg.display.show_timestamps);
}

pub fn run(
    mut config: AppConfig,
    config_path: &Path,
    action: SettingsAction,
    format: OutputFormat,
) -> RcResult<()> {
    match action {
        SettingsAction::Show => match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            OutputFormat::Text => {
                print_settings_text(&config);
            }
        },
        SettingsAction::Get { key } => match get_setting_value(&config, &key) {
            Some(value) => match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "key": key, "value": value }));
                }
                OutputFormat::Text => {
                    println!("{key} = {value}");
                }
            },
            None => {
                println!("{} Unknown setting key: {}", style("ERROR").red().bold(), key);
                println!("  Use `relaychat settings show` to see available keys.");
                return Err(RcError::Config(format!("unknown setting key: {key}")));
            }
        },
        SettingsAction::Set { key, value } => {
            if let Err(e) = set_setting_value(&mut config, &key, &value) {
                println!("{} Failed to set {}: {}", style("ERROR").red().bold(), key, e);
                return Err(RcError::Config(e));
            }
            // Save to disk
            config.save_to_file(config_path)?;

            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({ "key": key, "value": value, "saved": true })
                    );
                }
                OutputFormat::Text => {
                    println!("{} {} = {}", style("SET").green().bold(), key, value);
                }
            }
        }
        SettingsAction::Path => match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "path": config_path.display().to_string(),
                        "exists": config_path.exists(),
                    })
                );
            }
            OutputFormat::Text => println!("{}", config_path.display()),
        },
        SettingsAction::Init { force } => {
            if config_path.exists() && !force {
                println!(
                    "{} {} already exists (use --force to overwrite)",
                    style("SKIP").yellow().bold(),
                    config_path.display()
                );
                return Ok(());
            }
            AppConfig::default().save_to_file(config_path)?;
            println!(
                "{} Default settings written to {}",
                style("OK").green().bold(),
                config_path.display()
            );
        }
    }

    Ok(())
}
