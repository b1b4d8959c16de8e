//! Logging setup.
//!
//! Console output goes to stderr so it never interleaves with chat output on
//! stdout. The file copy rotates daily and can be written as JSON lines.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::LOG_FILE_NAME;
use crate::error::{RcError, RcResult};

/// Install the global subscriber: stderr plus `<log_dir>/relaychat.log.<date>`.
///
/// `level` accepts any filter directive, e.g. `"info"` or
/// `"rc_socket=debug,info"`. Fails if a subscriber is already installed.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> RcResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_NAME));

    let file_layer = if json_output {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(level_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .map_err(|e| RcError::Internal(format!("logging already initialized: {e}")))?;

    tracing::info!(filter = level, dir = %log_dir.display(), "logging initialized");
    Ok(LogGuard { _worker: guard })
}

/// Flushes the log file when dropped. Hold it for the life of the process.
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Stderr only; a no-op once any subscriber is installed.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(level_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

/// Parse `level`, falling back to `info` on a bad directive.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}
