// ABOUTME: Entry point for the wake-up alarm daemon.
// ABOUTME: Loads config, opens the state store, and runs the trigger engine until SIGTERM or SIGINT.

use std::path::Path;
use std::time::Duration;

use wakeup_alarm::config::Config;
use wakeup_alarm::persistence::{StateStore, StoreError};
use wakeup_alarm::runtime;

const STORE_OPEN_ATTEMPTS: u32 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    // Register signal handlers early so they work during startup
    let mut sigterm = tokio::signal::unix::signal(
        tokio::signal::unix::SignalKind::terminate(),
    ).expect("Failed to register SIGTERM handler");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Fatal: {e}");
            std::process::exit(1);
        }
    };

    let state_file = config.layout().state_file();
    let store = match open_store(&state_file).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Fatal: state store at {} is unusable: {e}", state_file.display());
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = runtime::run(&config, store) => {
            if let Err(e) = result {
                tracing::error!("Fatal: {e}");
                runtime::shutdown(&config).await;
                std::process::exit(1);
            }
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }

    runtime::shutdown(&config).await;
}

/// Open the state store, retrying briefly in case the disk is still being mounted.
async fn open_store(path: &Path) -> Result<StateStore, StoreError> {
    let mut attempt = 1;
    loop {
        match StateStore::open(path) {
            Ok(store) => return Ok(store),
            Err(e) if attempt < STORE_OPEN_ATTEMPTS => {
                tracing::warn!("State store not ready (attempt {attempt}/{STORE_OPEN_ATTEMPTS}): {e}");
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
