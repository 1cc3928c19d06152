use clap::Parser;
use std::error::Error;
use std::path::PathBuf;

use aqi_alert_service::alert::notifier::LogNotifier;
use aqi_alert_service::config::ServiceConfig;
use aqi_alert_service::ingest::api::ApiClient;
use aqi_alert_service::logging::{self, Component, LogLevel};
use aqi_alert_service::pipeline::{AlertPipeline, PipelineSettings};

/// Watch AQI preferences and forecasts and log an alert whenever the
/// configured threshold is crossed.
#[derive(Parser)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level (debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        config.validate()?;
    }

    let level: LogLevel = config.logging.level.parse()?;
    logging::init_logger(level, config.logging.file.as_deref(), config.logging.timestamps);

    let client = ApiClient::from_config(&config)?;
    logging::info(Component::System, Some(&config.api.base_url), "using backend");
    if !client.has_token() {
        logging::warn(
            Component::System,
            None,
            "no API token configured; forecast alerts are unavailable",
        );
    }

    let handle = AlertPipeline::new(client, LogNotifier, PipelineSettings::from(&config)).start();

    tokio::signal::ctrl_c().await?;
    handle.shutdown();
    Ok(())
}
