//! RelayChat CLI - terminal client and development relay.
//!
//! Chat with other clients through a WebSocket relay, probe a relay, run a
//! local relay for testing, and manage the configuration file.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use rc_core::config::AppConfig;
use rc_core::error::RcResult;
use rc_core::logging;

/// RelayChat - realtime chat over a WebSocket relay.
#[derive(Parser)]
#[command(
    name = "relaychat",
    version,
    about = "RelayChat terminal client",
    long_about = "A terminal client for RelayChat.\n\
                   Connect to a WebSocket relay to exchange messages with every other connected client."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive chat session.
    Chat {
        /// Relay address (overrides config).
        #[arg(short, long)]
        address: Option<String>,
        /// How to treat the relay echoing our own messages (overrides config).
        #[arg(short, long)]
        echo: Option<commands::chat::EchoArg>,
    },
    /// Probe a relay: connect once and report the outcome.
    Status {
        /// Relay address (overrides config).
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Run a development relay.
    Relay {
        /// Address to listen on.
        #[arg(short, long)]
        bind: Option<String>,
        /// Do not send frames back to their sender.
        #[arg(long)]
        no_echo: bool,
    },
    /// View and modify settings.
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
}

#[tokio::main]
async fn main() -> RcResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match cli.config.as_deref() {
        Some(path) => PathBuf::from(path),
        None => AppConfig::default_config_path()?,
    };
    let config_exists = config_path.exists();
    let config = if config_exists {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logging. The chat screen only shows warnings unless verbose.
    let log_level = if cli.verbose {
        "debug".to_string()
    } else if matches!(cli.command, Commands::Chat { .. }) {
        "warn".to_string()
    } else {
        config.logging.level.clone()
    };
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from(".").join("logs"));
    let _guard = logging::init_logging(&log_level, &log_dir, config.logging.json_output)?;

    info!("RelayChat CLI v{}", rc_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Chat { address, echo } => {
            commands::chat::run(config, config_exists, address, echo, cli.format).await
        }
        Commands::Status { address } => commands::status::run(&config, address, cli.format).await,
        Commands::Relay { bind, no_echo } => commands::relay::run(bind, no_echo, cli.format).await,
        Commands::Settings { action } => {
            commands::settings::run(config, &config_path, action, cli.format)
        }
    }
}
