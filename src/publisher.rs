//! Fire-and-forget publishing over short-lived broker connections.

use crate::config::Config;
use crate::models::OutboundMessage;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("MQTT client error: {0}")]
    Client(#[from] ClientError),
    #[error("MQTT connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Publish did not complete within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publishes one message on its own connection.
    async fn single(&self, message: OutboundMessage) -> Result<(), PublishError> {
        self.multiple(vec![message]).await
    }

    /// Publishes all `messages` over one connection, then disconnects.
    async fn multiple(&self, messages: Vec<OutboundMessage>) -> Result<(), PublishError>;
}

/// Opens a fresh connection for every call and closes it once delivery completes.
#[derive(Debug, Clone)]
pub struct EphemeralPublisher {
    host: String,
    port: u16,
    client_id: String,
    keep_alive: Duration,
    timeout: Duration,
}

impl EphemeralPublisher {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.mqtt_server.clone(),
            port: config.mqtt_port,
            client_id: config.mqtt_client_id.clone(),
            keep_alive: Duration::from_secs(config.mqtt_keep_alive_secs),
            timeout: config.publish_timeout(),
        }
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("{}-pub-{}", self.client_id, Uuid::new_v4());
        let mut mqtt_options = MqttOptions::new(client_id, self.host.clone(), self.port);
        mqtt_options.set_keep_alive(self.keep_alive);
        mqtt_options.set_clean_session(true);
        mqtt_options
    }
}

/// Polls until `total` publishes finished their QoS handshake and DISCONNECT went out.
async fn drive(
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    total: usize,
) -> Result<(), PublishError> {
    let mut completed = 0;
    let mut disconnecting = false;

    loop {
        match eventloop.poll().await? {
            // QoS 0 publishes carry no packet id and are done once written
            Event::Outgoing(Outgoing::Publish(0)) => completed += 1,
            Event::Incoming(Packet::PubAck(_)) | Event::Incoming(Packet::PubComp(_)) => {
                completed += 1
            }
            Event::Outgoing(Outgoing::Disconnect) => return Ok(()),
            _ => {}
        }

        if completed >= total && !disconnecting {
            client.try_disconnect()?;
            disconnecting = true;
        }
    }
}

#[async_trait]
impl BrokerPublisher for EphemeralPublisher {
    async fn multiple(&self, messages: Vec<OutboundMessage>) -> Result<(), PublishError> {
        if messages.is_empty() {
            return Ok(());
        }

        let total = messages.len();
        let (client, mut eventloop) = AsyncClient::new(self.options(), total + 1);

        for message in messages {
            debug!(
                "Queueing publish to '{}' ({} bytes, {:?})",
                message.topic,
                message.payload.len(),
                message.qos
            );
            client
                .publish(message.topic, message.qos, message.retain, message.payload)
                .await?;
        }

        tokio::time::timeout(self.timeout, drive(&client, &mut eventloop, total))
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;

        debug!(
            "Published {} messages to {}:{}",
            total, self.host, self.port
        );
        Ok(())
    }
}
