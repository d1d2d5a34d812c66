use rumqttc::{ConnectReturnCode, Publish, SubAck, SubscribeReasonCode};
use tracing::{debug, warn};

/// Receives the lifecycle events of the long-lived broker session.
///
/// Callbacks run on the session's event loop task and must return promptly.
pub trait SessionListener: Send + Sync {
    /// Called for every connect attempt the broker answered, including reconnects.
    fn on_connect(&self, code: ConnectReturnCode);
    fn on_message(&self, publish: &Publish);
    fn on_publish_ack(&self, pkid: u16);
    fn on_subscribe_ack(&self, ack: &SubAck);
}

/// Default listener: every event becomes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

pub fn connack_string(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "Connection Accepted.",
        ConnectReturnCode::RefusedProtocolVersion => {
            "Connection Refused: unacceptable protocol version."
        }
        ConnectReturnCode::BadClientId => "Connection Refused: identifier rejected.",
        ConnectReturnCode::ServiceUnavailable => "Connection Refused: broker unavailable.",
        ConnectReturnCode::BadUserNamePassword => "Connection Refused: bad user name or password.",
        ConnectReturnCode::NotAuthorized => "Connection Refused: not authorised.",
    }
}

impl SessionListener for LoggingListener {
    fn on_connect(&self, code: ConnectReturnCode) {
        debug!("Broker answered connect: {}", connack_string(code));
    }

    fn on_message(&self, publish: &Publish) {
        debug!(
            "Message received. topic: {}, payload: {}",
            publish.topic,
            String::from_utf8_lossy(&publish.payload)
        );
    }

    fn on_publish_ack(&self, pkid: u16) {
        debug!("Publish acknowledged: Message ID={}", pkid);
    }

    fn on_subscribe_ack(&self, ack: &SubAck) {
        debug!(
            "Subscribe acknowledged: Message ID={}, granted_qos={:?}",
            ack.pkid, ack.return_codes
        );
        let rejected = ack
            .return_codes
            .iter()
            .filter(|code| matches!(code, SubscribeReasonCode::Failure))
            .count();
        if rejected > 0 {
            warn!(
                "Broker rejected {} of {} subscriptions (Message ID={})",
                rejected,
                ack.return_codes.len(),
                ack.pkid
            );
        }
    }
}
