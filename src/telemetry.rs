//! Periodic sampling of device state onto the broker.

use crate::config::Config;
use crate::data_source::{DataSourceError, DeviceDataSource};
use crate::models::{scalar_payload, GpsPayload, GpsReading, OutboundMessage};
use crate::publisher::{BrokerPublisher, PublishError};
use rumqttc::QoS;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("No GPS position available for '{0}'")]
    MissingGps(String),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct TelemetryPublisher {
    source: Arc<dyn DeviceDataSource>,
    publisher: Arc<dyn BrokerPublisher>,
    gps_topic: String,
    modem_temp_topic: String,
    wan_connection_state_topic: String,
    qos: QoS,
    interval: Duration,
}

impl TelemetryPublisher {
    pub fn new(
        config: &Config,
        source: Arc<dyn DeviceDataSource>,
        publisher: Arc<dyn BrokerPublisher>,
    ) -> Self {
        Self {
            source,
            publisher,
            gps_topic: config.gps_topic.clone(),
            modem_temp_topic: config.modem_temp_topic.clone(),
            wan_connection_state_topic: config.wan_connection_state_topic.clone(),
            qos: config.qos(),
            interval: config.publish_interval(),
        }
    }

    /// One sample-and-publish pass.
    pub async fn publish_cycle(&self) -> Result<(), TelemetryError> {
        let reading = self
            .source
            .get(&self.gps_topic)
            .await?
            .and_then(GpsReading::from_value)
            .ok_or_else(|| TelemetryError::MissingGps(self.gps_topic.clone()))?;

        let payload = serde_json::to_vec(&GpsPayload::from(reading))?;
        self.publisher
            .single(OutboundMessage::new(&self.gps_topic, payload, self.qos))
            .await?;

        let modem_temp = self.source.get(&self.modem_temp_topic).await?;
        let wan_connection_state = self.source.get(&self.wan_connection_state_topic).await?;

        self.publisher
            .multiple(vec![
                OutboundMessage::new(&self.modem_temp_topic, scalar_payload(modem_temp), self.qos),
                OutboundMessage::new(
                    &self.wan_connection_state_topic,
                    scalar_payload(wan_connection_state),
                    self.qos,
                ),
            ])
            .await?;

        Ok(())
    }

    /// Publishes every `interval` until cancelled. A failed cycle never ends the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Starting telemetry publisher (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.publish_cycle() => match result {
                    Ok(()) => debug!("Telemetry cycle published."),
                    Err(e) => error!("Telemetry cycle failed: {}", e),
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!("Telemetry publisher stopped.");
    }
}
