//! # Store Serial
//!
//! Serial command channel between the inventory UI and the store's Arduino.
//!
//! Reads JSON-lines requests on stdin and answers on stdout; logs go to stderr.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::stdout;
use tracing::{info, warn};

use store_serial::bridge;
use store_serial::config::Config;
use store_serial::logging;
use store_serial::selection::SelectionService;
use store_serial::serial::{self, ConnectionManager, PortDescriptor};

/// Main entry point for Store Serial
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, defaults when absent)
///    - Set up logging
///    - Pick the serial backend and build the connection manager
///    - Open the configured port, if any
///
/// 2. **Main Loop**
///    - Answer bridge requests until stdin closes
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Release the port
///
/// # Examples
///
/// ```bash
/// echo '{"op":"list_ports"}' | cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };

    let _log_guard = logging::init(&config.logging)?;

    info!("Store Serial v{} starting...", env!("CARGO_PKG_VERSION"));

    let transport = serial::select_transport(
        config.serial.backend,
        config.web.granted.clone(),
        config.web.filters.clone(),
        config.open_settle(),
    )
    .await?;
    let manager = Arc::new(ConnectionManager::new(transport, config.timeouts()));
    let service = SelectionService::with_opcode(manager, config.opcode()?);

    if let Some(path) = &config.serial.port {
        if let Err(e) = service.connect(Some(PortDescriptor::new(path.clone()))).await {
            warn!("Could not open configured port {}: {}", path, e);
        }
    }

    // Blocking stdin reads stay on their own thread so Ctrl+C can exit
    // while the parent still holds the pipe open
    let lines = bridge::spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
        .context("Failed to start stdin reader")?;

    info!("Waiting for requests on stdin, press Ctrl+C to exit");

    let result = tokio::select! {
        result = bridge::serve(&service, lines, stdout()) => {
            info!("Input closed, shutting down...");
            result.context("Bridge I/O failed")
        }

        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    };

    if let Err(e) = service.disconnect().await {
        warn!("Failed to close port: {}", e);
    }

    result
}
