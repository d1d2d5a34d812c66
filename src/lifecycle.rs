use crate::config::Config;
use crate::data_source::{DataSourceError, DeviceDataSource, HttpDataSource};
use crate::listener::{LoggingListener, SessionListener};
use crate::mqtt_service::{MqttService, SessionError};
use crate::publisher::{BrokerPublisher, EphemeralPublisher};
use crate::telemetry::TelemetryPublisher;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("MQTT service task failed: {0}")]
    Task(#[from] JoinError),
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            other => Err(AppError::UnknownCommand(other.to_string())),
        }
    }
}

/// Owns everything one running instance needs: the broker session is created per `start`.
pub struct RouterApp {
    config: Config,
    source: Arc<dyn DeviceDataSource>,
    publisher: Arc<dyn BrokerPublisher>,
    listener: Arc<dyn SessionListener>,
    cancel: CancellationToken,
}

impl RouterApp {
    pub fn new(
        config: Config,
        source: Arc<dyn DeviceDataSource>,
        publisher: Arc<dyn BrokerPublisher>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        Self {
            config,
            source,
            publisher,
            listener,
            cancel: CancellationToken::new(),
        }
    }

    /// Wires the router HTTP data source, ephemeral publishing and the logging listener.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let source = HttpDataSource::new(&config.data_source_url, config.publish_timeout())?;
        let publisher = EphemeralPublisher::from_config(&config);

        Ok(Self::new(
            config,
            Arc::new(source),
            Arc::new(publisher),
            Arc::new(LoggingListener),
        ))
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn action(&self, command: Command) -> Result<(), AppError> {
        debug!("Running command {:?}", command);

        let result = match command {
            Command::Start => self.start().await,
            Command::Stop => {
                self.stop();
                Ok(())
            }
        };

        if let Err(e) = &result {
            error!("{:?} failed: {}", command, e);
        }
        result
    }

    /// Runs the broker session in the background and the telemetry loop on this task.
    ///
    /// Returns when cancelled, on Ctrl+C, or once the run time guard elapses.
    pub async fn start(&self) -> Result<(), AppError> {
        info!(
            "Starting router app: MQTT connect to {}:{} as '{}'",
            self.config.mqtt_server, self.config.mqtt_port, self.config.mqtt_client_id
        );

        let session = MqttService::connect(&self.config, self.listener.clone());
        let session_task = tokio::spawn(session.clone().run(self.cancel.clone()));

        let telemetry =
            TelemetryPublisher::new(&self.config, self.source.clone(), self.publisher.clone());
        let guard = self.config.run_timeout();

        tokio::select! {
            _ = telemetry.run(self.cancel.clone()) => {}
            _ = sleep(guard) => {
                warn!("Run time limit of {:?} reached, stopping.", guard);
            }
            _ = shutdown_signal() => {
                info!("Received Ctrl+C, shutting down...");
            }
        }

        self.cancel.cancel();
        session_task.await??;
        debug!("MQTT session ended in state {:?}", session.state().await);

        info!("Router app stopped.");
        Ok(())
    }

    /// Nothing to tear down here: a running instance ends with its process.
    pub fn stop(&self) {
        info!("Stop requested for router app.");
    }
}

/// Resolves on Ctrl+C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to handle termination signal: {:?}", e);
        std::future::pending::<()>().await;
    }
}
