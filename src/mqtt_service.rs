use crate::config::Config;
use crate::listener::SessionListener;
use crate::subscriptions::{Subscriber, SubscriptionManager};
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("MQTT event loop is already running or was never created")]
    EventLoopUnavailable,
}

/// The long-lived MQTT session. Owns the client and its event loop.
pub struct MqttService {
    client_state: Mutex<ClientState>,
    subscriber: Arc<dyn Subscriber>,
    eventloop: Mutex<Option<EventLoop>>,
    listener: Arc<dyn SessionListener>,
    subscriptions: SubscriptionManager,
    reconnect_delay: Duration,
    connects: AtomicUsize,
    messages_received: AtomicUsize,
}

impl MqttService {
    /// Prepares the session for `config`'s broker. No traffic happens until [`MqttService::run`].
    pub fn connect(config: &Config, listener: Arc<dyn SessionListener>) -> Arc<Self> {
        debug!(
            "Configuring MQTT broker at {}:{}...",
            config.mqtt_server, config.mqtt_port
        );

        let mut mqtt_options = MqttOptions::new(
            config.mqtt_client_id.clone(),
            config.mqtt_server.clone(),
            config.mqtt_port,
        );
        mqtt_options.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs));
        mqtt_options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(mqtt_options, 10);

        Self::from_parts(
            Arc::new(client),
            Some(eventloop),
            listener,
            SubscriptionManager::new(config.topics(), config.qos()),
            config.reconnect_delay(),
        )
    }

    pub(crate) fn from_parts(
        subscriber: Arc<dyn Subscriber>,
        eventloop: Option<EventLoop>,
        listener: Arc<dyn SessionListener>,
        subscriptions: SubscriptionManager,
        reconnect_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            client_state: Mutex::new(ClientState::Disconnected),
            subscriber,
            eventloop: Mutex::new(eventloop),
            listener,
            subscriptions,
            reconnect_delay,
            connects: AtomicUsize::new(0),
            messages_received: AtomicUsize::new(0),
        })
    }

    pub async fn state(&self) -> ClientState {
        self.client_state.lock().await.clone()
    }

    async fn set_state(&self, state: ClientState) {
        let mut client_state = self.client_state.lock().await;
        *client_state = state;
    }

    /// Drives the network loop until `cancel` fires.
    ///
    /// Connection errors are not fatal: the event loop reconnects on the next poll.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), SessionError> {
        let mut eventloop = match self.eventloop.lock().await.take() {
            Some(eventloop) => eventloop,
            None => {
                error!("Cannot start MQTT service: event loop unavailable");
                return Err(SessionError::EventLoopUnavailable);
            }
        };

        info!("Starting MQTT service...");
        self.set_state(ClientState::Connecting).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("MQTT service cancelled.");
                    break;
                }
                polled = eventloop.poll() => match polled {
                    Ok(event) => self.handle_event(event).await,
                    Err(e) => {
                        self.handle_connection_error(e).await;

                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!("MQTT service cancelled while reconnecting.");
                                break;
                            }
                            _ = sleep(self.reconnect_delay) => {
                                self.set_state(ClientState::Connecting).await;
                            }
                        }
                    }
                },
            }
        }

        self.set_state(ClientState::Disconnected).await;
        Ok(())
    }

    async fn handle_connection_error(&self, e: ConnectionError) {
        match e {
            ConnectionError::ConnectionRefused(code) => self.listener.on_connect(code),
            other => error!("Error in MQTT event loop: {:?}", other),
        }

        self.set_state(ClientState::Disconnected).await;
        warn!("{}", self.retry_notice());
    }

    fn retry_notice(&self) -> String {
        match self.connects.load(Ordering::Relaxed) {
            0 => format!(
                "Could not reach MQTT broker. Retrying in {:?}...",
                self.reconnect_delay
            ),
            connects => format!(
                "Lost connection to MQTT broker after {} connects, {} messages received. Retrying in {:?}...",
                connects,
                self.messages_received.load(Ordering::Relaxed),
                self.reconnect_delay
            ),
        }
    }

    /// Dispatches one event to the listener, in arrival order.
    pub(crate) async fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                let accepted = ack.code == ConnectReturnCode::Success;
                self.listener.on_connect(ack.code);
                if accepted {
                    info!("Connected to MQTT broker.");
                    self.connects.fetch_add(1, Ordering::Relaxed);
                    self.set_state(ClientState::Connected).await;
                    // Renewed on every connect so a reconnect never loses subscriptions
                    self.subscriptions.on_connected(self.subscriber.as_ref());
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                self.listener.on_message(&publish);
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                self.listener.on_publish_ack(ack.pkid);
            }
            Event::Incoming(Packet::PubComp(comp)) => {
                self.listener.on_publish_ack(comp.pkid);
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                self.listener.on_subscribe_ack(&ack);
            }
            Event::Outgoing(outgoing) => {
                debug!("Outgoing event: {:?}", outgoing);
            }
            _ => {
                debug!("Unhandled event: {:?}", event);
            }
        }
    }
}
