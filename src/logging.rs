//! # Logging Setup
//!
//! Installs the global `tracing` subscriber. Console output goes to stderr so
//! stdout stays reserved for bridge responses; an optional daily rolling file
//! is written through a non-blocking worker.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Prefix of the rolling log files
pub const LOG_FILE_PREFIX: &str = "store-serial.log";

/// Initialize logging
///
/// `RUST_LOG` takes precedence over `config.level`.
///
/// # Returns
///
/// * `Result<Option<WorkerGuard>>` - Guard for the file writer; keep it alive
///   until shutdown or buffered lines are lost
///
/// # Errors
///
/// Returns error if the level is not a valid filter or a global subscriber
/// is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid logging level {:?}", config.level))?,
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Daily rolling file writer in `dir`
pub fn file_writer<P: AsRef<Path>>(dir: P) -> (NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    tracing_appender::non_blocking(appender)
}
