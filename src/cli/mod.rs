pub mod config;
pub mod ingest;
pub mod monitor;
pub mod ship;

use crate::config::{default_config_paths, load_config, resolve_config_path, Config, ConfigError};
use std::path::Path;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("config not found (searched: {searched}); use --config <path> or run 'logsync config init'")]
    ConfigNotFound { searched: String },

    #[error("shipper error: {0}")]
    Shipper(#[from] crate::shipper::ShipperError),

    #[error("ingest error: {0}")]
    Ingest(#[from] crate::ingest::IngestError),

    #[error("monitor error: {0}")]
    Monitor(#[from] crate::monitor::MonitorError),

    #[error("notification error: {0}")]
    Notify(#[from] crate::monitor::NotifyError),
}

/// Resolves and loads the configuration for a subcommand.
pub fn load(explicit: Option<&Path>) -> Result<Config, RunError> {
    let Some(path) = resolve_config_path(explicit) else {
        let searched = default_config_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(RunError::ConfigNotFound { searched });
    };

    info!(config_path = %path.display(), "Loading configuration");
    Ok(load_config(&path)?)
}

/// Creates `dir` if it is missing. Failures are logged; the component that
/// needs the directory reports the real error later.
pub(crate) fn ensure_dir(dir: &Path) {
    if dir.as_os_str().is_empty() || dir.exists() {
        return;
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => info!(path = %dir.display(), "Created directory"),
        Err(e) => warn!(path = %dir.display(), error = %e, "Could not create directory"),
    }
}

pub(crate) fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        ensure_dir(parent);
    }
}

/// A shutdown flag that turns true on Ctrl+C.
pub(crate) fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for Ctrl+C");
                // Keep the sender alive so receivers do not read a closed channel as shutdown.
                std::future::pending::<()>().await;
            }
        }
    });
    shutdown_rx
}
