//! Relay command - run the development relay in the foreground.

use std::time::Duration;

use console::style;
use tracing::{info, warn};

use rc_core::constants::{DEFAULT_CLOSE_TIMEOUT_MS, DEFAULT_RELAY_BIND};
use rc_core::error::RcResult;
use rc_relay::Relay;

use crate::OutputFormat;

/// Run the relay command until Ctrl+C.
pub async fn run(bind: Option<String>, no_echo: bool, format: OutputFormat) -> RcResult<()> {
    let bind = bind.unwrap_or_else(|| DEFAULT_RELAY_BIND.to_string());
    let relay = Relay::bind(&bind).await?.with_echo_to_sender(!no_echo);
    let local_addr = relay.local_addr()?;
    let registry = relay.registry();

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "listening": format!("ws://{local_addr}"), "echo_to_sender": !no_echo })
        ),
        OutputFormat::Text => {
            println!(
                "{} Relay listening on {} (echo to sender: {})",
                style("OK").green().bold(),
                style(format!("ws://{local_addr}")).bold(),
                if no_echo { "off" } else { "on" }
            );
            println!("  Press Ctrl+C to stop.");
        }
    }

    tokio::select! {
        () = relay.run() => {}
        _ = tokio::signal::ctrl_c() => {
            let dropped = registry.disconnect_all();
            info!("relay stopping, closing {dropped} peer connection(s)");
            let limit = Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS);
            if !registry.wait_closed(limit).await {
                warn!(
                    "{} connection(s) still open after {limit:?}",
                    registry.open_connections()
                );
            }
        }
    }

    Ok(())
}
