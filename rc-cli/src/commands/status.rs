//! Status command - probe a relay once.

use std::time::Instant;

use console::style;

use rc_core::config::AppConfig;
use rc_core::error::RcResult;
use rc_socket::{ConnectionEvent, ConnectionManager, ConnectionOptions, ConnectionState};

use crate::OutputFormat;

/// Outcome of one probe.
#[derive(Debug)]
struct Probe {
    address: String,
    state: ConnectionState,
    latency_ms: u128,
    failure: Option<String>,
}

/// Run the status command.
pub async fn run(config: &AppConfig, address: Option<String>, format: OutputFormat) -> RcResult<()> {
    let address = super::resolve_address(config, address);
    let probe = probe(&address, ConnectionOptions::from_config(config)).await;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&probe_json(&probe)).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            println!("{}", style("Connection").bold().underlined());
            println!("  Relay:     {}", probe.address);
            if probe.state == ConnectionState::Open {
                println!(
                    "  Status:    {} ({}ms)",
                    style("reachable").green(),
                    probe.latency_ms
                );
            } else {
                println!("  Status:    {}", style("unreachable").red());
                if let Some(reason) = &probe.failure {
                    println!("  Reason:    {}", super::truncate(reason, 120));
                }
            }
            println!(
                "  Timeout:   {}ms connect, {}ms close",
                config.server.connect_timeout_ms, config.server.close_timeout_ms
            );
        }
    }

    Ok(())
}

/// Connect once, wait for `Open` or the first failure, then shut down.
async fn probe(address: &str, options: ConnectionOptions) -> Probe {
    let mut manager = ConnectionManager::websocket(address, options);
    let mut events = manager.subscribe();

    let started = Instant::now();
    manager.start();

    let mut failure = None;
    let state = loop {
        match events.recv().await {
            Some(ConnectionEvent::StateChanged {
                current: ConnectionState::Open,
                ..
            }) => break ConnectionState::Open,
            Some(ConnectionEvent::Failed(kind)) => {
                failure = Some(kind.to_string());
                break ConnectionState::Failed;
            }
            Some(_) => continue,
            None => break manager.state(),
        }
    };
    let latency_ms = started.elapsed().as_millis();

    manager.shutdown().await;

    Probe {
        address: address.to_string(),
        state,
        latency_ms,
        failure,
    }
}

fn probe_json(probe: &Probe) -> serde_json::Value {
    serde_json::json!({
        "relay_address": probe.address,
        "reachable": probe.state == ConnectionState::Open,
        "state": probe.state.to_string(),
        "latency_ms": probe.latency_ms as u64,
        "failure": probe.failure,
    })
}
