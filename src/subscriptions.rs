use rumqttc::{AsyncClient, ClientError, QoS, SubscribeFilter};
use tracing::{error, info};

/// The part of the MQTT client the subscription manager needs.
pub trait Subscriber: Send + Sync {
    /// Queues one SUBSCRIBE for all `filters` without waiting on the event loop.
    fn subscribe_all(&self, filters: Vec<SubscribeFilter>) -> Result<(), ClientError>;
}

impl Subscriber for AsyncClient {
    fn subscribe_all(&self, filters: Vec<SubscribeFilter>) -> Result<(), ClientError> {
        self.try_subscribe_many(filters)
    }
}

/// Keeps the fixed topic set subscribed across reconnects.
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    topics: Vec<String>,
    qos: QoS,
}

impl SubscriptionManager {
    pub fn new<I, S>(topics: I, qos: QoS) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            qos,
        }
    }

    pub fn filters(&self) -> Vec<SubscribeFilter> {
        self.topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), self.qos))
            .collect()
    }

    /// Issues the subscription for a freshly established session.
    ///
    /// Failures are logged and swallowed; the session stays up without subscriptions.
    pub fn on_connected(&self, client: &dyn Subscriber) -> bool {
        match client.subscribe_all(self.filters()) {
            Ok(()) => {
                info!(
                    "Subscribing to {} topics at {:?}: {:?}",
                    self.topics.len(),
                    self.qos,
                    self.topics
                );
                true
            }
            Err(e) => {
                error!("Failed to subscribe to {:?}: {}", self.topics, e);
                false
            }
        }
    }
}
