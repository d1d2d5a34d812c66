mod config;
mod data_source;
mod lifecycle;
mod listener;
mod models;
mod mqtt_service;
mod publisher;
mod subscriptions;
mod telemetry;
#[cfg(test)]
mod test_broker;

use crate::config::Config;
use crate::lifecycle::{Command, RouterApp};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Publishes the router's GPS position, modem temperature and WAN state over MQTT.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// `start` or `stop`
    opt: String,
}

fn setup_logging() {
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` may set LOG_LEVEL, so it is loaded before the logger. `Config::from_env`
    // loads it again for callers that skip `main`; dotenvy never overrides set variables.
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let command = match cli.opt.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            info!("Failed to run command: {}", e);
            return ExitCode::SUCCESS;
        }
    };

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {:?}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("{:#?}", config);

    let app = match RouterApp::from_config(config) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to set up router app: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if app.action(command).await.is_err() {
        return ExitCode::FAILURE;
    }

    info!("App is exiting");
    ExitCode::SUCCESS
}
