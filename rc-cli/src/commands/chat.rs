//! Chat command - interactive terminal session.

use console::style;
use dialoguer::Input;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use rc_core::config::{AppConfig, EchoPolicy};
use rc_core::error::{RcError, RcResult};
use rc_session::{ChatEntry, ChatSession, Origin, SessionEvent, SessionOptions};
use rc_socket::ConnectionState;

use crate::OutputFormat;

/// Echo policy as written on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EchoArg {
    /// Log every inbound frame, including echoes of our own messages.
    KeepAll,
    /// Drop the relay's echo of each message we sent.
    SuppressOwn,
}

impl From<EchoArg> for EchoPolicy {
    fn from(arg: EchoArg) -> Self {
        match arg {
            EchoArg::KeepAll => EchoPolicy::KeepAll,
            EchoArg::SuppressOwn => EchoPolicy::SuppressOwn,
        }
    }
}

/// Run the chat command.
pub async fn run(
    mut config: AppConfig,
    config_exists: bool,
    address: Option<String>,
    echo: Option<EchoArg>,
    format: OutputFormat,
) -> RcResult<()> {
    // Determine address: arg > config file > interactive prompt
    config.server.address = match address {
        Some(address) => AppConfig::sanitize_server_address(&address),
        None if !config_exists && console::user_attended() => {
            let entered: String = Input::new()
                .with_prompt("Relay address")
                .default(config.server.address.clone())
                .interact_text()
                .map_err(|e| RcError::Internal(e.to_string()))?;
            AppConfig::sanitize_server_address(&entered)
        }
        None => config.server.address.clone(),
    };
    if config.server.address.is_empty() {
        return Err(RcError::MissingConfig("server address".into()));
    }
    if let Some(echo) = echo {
        config.session.echo_policy = echo.into();
    }

    let mut session = ChatSession::new(
        config.server.address.clone(),
        SessionOptions::from_config(&config),
    );
    let mut events = session.subscribe();
    let view = View {
        format,
        user_name: config.display.user_name.clone(),
        show_timestamps: config.display.show_timestamps,
    };

    if format == OutputFormat::Text {
        println!(
            "{} Connecting to {} (echo: {})...",
            style("::").bold().dim(),
            session.address(),
            session.echo_policy()
        );
        println!(
            "  Type a message and press Enter. {} or Ctrl+C to quit.",
            style("/quit").bold()
        );
        println!();
    }
    session.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim() == "/quit" => break,
                    Ok(Some(line)) => match session.submit(&line).await {
                        Ok(_) | Err(RcError::EmptyMessage) => {}
                        Err(RcError::SendFailed(_)) => {}
                        Err(e) => view.notice(&e.to_string()),
                    },
                    // stdin closed
                    Ok(None) => break,
                    Err(e) => {
                        view.notice(&format!("failed to read input: {e}"));
                        break;
                    }
                }
            }
            more = session.process_next() => {
                if !more {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
        view.render_pending(&mut events);
    }

    if format == OutputFormat::Text {
        println!("\n  Disconnecting...");
    }
    session.close().await;
    view.render_pending(&mut events);
    Ok(())
}

/// Renders session events on stdout.
struct View {
    format: OutputFormat,
    user_name: String,
    show_timestamps: bool,
}

impl View {
    fn render_pending(&self, events: &mut broadcast::Receiver<SessionEvent>) {
        loop {
            match events.try_recv() {
                Ok(event) => self.render(&event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.notice(&format!("missed {n} events (slow terminal)"));
                }
                Err(_) => break,
            }
        }
    }

    fn render(&self, event: &SessionEvent) {
        match self.format {
            OutputFormat::Json => println!("{}", event_json(event)),
            OutputFormat::Text => match event {
                SessionEvent::EntryAppended(entry) => println!("{}", self.entry_line(entry)),
                SessionEvent::StatusChanged(state) => {
                    println!("  {} {}", style("status").dim(), styled_state(*state));
                }
                SessionEvent::SendFailed { sequence, reason } => {
                    println!(
                        "  {} message #{sequence} not delivered: {reason}",
                        style("FAIL").red().bold()
                    );
                }
                SessionEvent::ConnectionFailed(reason) => {
                    println!("  {} {reason}", style("WARN").yellow());
                }
                SessionEvent::ReconnectScheduled { attempt, delay } => {
                    println!(
                        "  {} reconnecting in {:.1}s (attempt {attempt})",
                        style("..").dim(),
                        delay.as_secs_f64()
                    );
                }
            },
        }
    }

    fn entry_line(&self, entry: &ChatEntry) -> String {
        let author = match entry.origin {
            Origin::Local => style(self.user_name.as_str()).green().bold(),
            Origin::Remote => style("peer").cyan().bold(),
        };
        if self.show_timestamps {
            let at = entry.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
            format!("{} {author}: {}", style(format!("[{at}]")).dim(), entry.text)
        } else {
            format!("{author}: {}", entry.text)
        }
    }

    fn notice(&self, message: &str) {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "notice": message })),
            OutputFormat::Text => println!("  {} {message}", style("!!").yellow()),
        }
    }
}

fn styled_state(state: ConnectionState) -> console::StyledObject<String> {
    let text = state.to_string();
    match state {
        ConnectionState::Open => style(text).green(),
        ConnectionState::Connecting | ConnectionState::Closing => style(text).yellow(),
        ConnectionState::Failed => style(text).red(),
        ConnectionState::Disconnected => style(text).dim(),
    }
}

/// One JSON line per session event.
fn event_json(event: &SessionEvent) -> serde_json::Value {
    match event {
        SessionEvent::EntryAppended(entry) => serde_json::json!({
            "event": "entry",
            "entry": entry,
        }),
        SessionEvent::StatusChanged(state) => serde_json::json!({
            "event": "status",
            "status": state.to_string(),
        }),
        SessionEvent::SendFailed { sequence, reason } => serde_json::json!({
            "event": "send_failed",
            "sequence": sequence,
            "reason": reason,
        }),
        SessionEvent::ConnectionFailed(reason) => serde_json::json!({
            "event": "connection_failed",
            "reason": reason,
        }),
        SessionEvent::ReconnectScheduled { attempt, delay } => serde_json::json!({
            "event": "reconnect_scheduled",
            "attempt": attempt,
            "delay_ms": delay.as_millis() as u64,
        }),
    }
}
