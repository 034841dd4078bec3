use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, error, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use mqtt_harness::{
    application::Application,
    cli::Cli,
    config::{ConfigManager, ConfigPaths},
};

fn init_log(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "mqtt_harness".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|()| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::load(ConfigPaths {
        pins: cli.pin_config.clone(),
        broker: cli.mqtt_config.clone(),
    })
    .and_then(|manager| manager.with_broker_overrides(cli.host.clone(), cli.port))
    .context("Failed to load configuration")?;

    Application::builder()
        .with_config_manager(config_manager)
        .with_session_settings(cli.session_settings())
        .build()?
        .run()
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_log(cli.log_level.into()) {
        eprintln!("Syslog unavailable ({e:#}); continuing without logging");
    }
    info!("mqtt_harness starting");

    match run(cli).await {
        Ok(()) => {
            info!("mqtt_harness finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
