use crate::cli::{ensure_parent, shutdown_on_ctrl_c, RunError};
use crate::config::{Config, ConfigError};
use crate::shipper::ShipperRunner;

pub async fn run(config: &Config) -> Result<(), RunError> {
    let shipper = config
        .shipper
        .clone()
        .ok_or(ConfigError::MissingSection("shipper"))?;

    ensure_parent(&shipper.offset_file);

    let shutdown = shutdown_on_ctrl_c();
    ShipperRunner::new(shipper).run(shutdown).await?;
    Ok(())
}
