//! # Payload Controller
//!
//! Flight software entry point for the balloon payload.
//!
//! ## Usage
//!
//! ```text
//! payload-controller [CONFIG_PATH]
//! ```
//!
//! `CONFIG_PATH` defaults to `config/default.toml`.
//!
//! ## Control Flow
//!
//! 1. **Initialization**
//!    - Load and validate the configuration
//!    - Set up logging to stdout and the session log file
//!    - Open the radio, the channel files and every sensor
//!
//! 2. **Main Loop**
//!    - Tick the acquisition scheduler until Ctrl+C or SIGTERM
//!
//! 3. **Teardown**
//!    - Stop sensors, close files, stop the radio

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use payload_controller::config::Config;
use payload_controller::logging;
use payload_controller::payload::FlightPayload;

/// Configuration used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

fn config_path(args: impl IntoIterator<Item = String>) -> String {
    args.into_iter()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn terminate() {
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (service stop, `kill`)
async fn shutdown_signal() {
    tokio::select! {
        _ = interrupt() => info!("Received Ctrl+C, shutting down..."),
        _ = terminate() => info!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::args());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let session_start = Utc::now();
    let _log_guard = logging::init(Path::new(&config.storage.log_dir), session_start)
        .context("Failed to initialize logging")?;

    info!("Payload controller v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let mut payload = FlightPayload::setup(&config, session_start)
        .await
        .context("Payload setup failed")?;

    info!("Press Ctrl+C or send SIGTERM to exit");
    payload.run_until(shutdown_signal()).await;

    payload.teardown().await.context("Teardown incomplete")?;
    Ok(())
}
