use crate::cli::{ensure_dir, shutdown_on_ctrl_c, RunError};
use crate::config::{Config, ConfigError};
use crate::ingest::start_server;

pub async fn run(config: &Config) -> Result<(), RunError> {
    let ingestor = config
        .ingestor
        .as_ref()
        .ok_or(ConfigError::MissingSection("ingestor"))?;

    ensure_dir(&ingestor.base_dir);

    let shutdown = shutdown_on_ctrl_c();
    start_server(ingestor, shutdown).await?;

    tracing::info!("Ingest server stopped");
    Ok(())
}
