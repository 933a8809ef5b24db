//! The `dockyard` daemon.

use anyhow::{Context, Result};
use daemon_runtime::{telemetry, DaemonConfig, Lifecycle, SignalTrap};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::from_env().context("failed to load configuration")?;
    telemetry::init_logging(&config.log)?;
    config.validate()?;

    let lifecycle = Lifecycle::boot(config).context("failed to boot daemon")?;

    let trap = SignalTrap::new(lifecycle.shutdown_trigger());
    if SignalTrap::debug_from_env() {
        warn!("DEBUG is set; SIGQUIT is not trapped");
    }
    let _trap = trap.spawn().context("failed to install signal handlers")?;

    info!(hosts = ?lifecycle.config().hosts, "Daemon starting");
    lifecycle.run().await?;
    Ok(())
}
