use anyhow::{Context, Result};
use choreo_monitoring::{init_logging, LogExt, MonitoringConfig};
use choreo_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment variables
    let config = ServerConfig::load().context("Failed to load configuration")?;

    let monitoring_config =
        MonitoringConfig::for_environment("choreo-server", &config.environment, &config.log_level);
    init_logging(&monitoring_config).context("Failed to initialize logging")?;

    choreo_server::run(config)
        .await
        .log_err("Server stopped")
        .context("Server error")?;

    Ok(())
}
