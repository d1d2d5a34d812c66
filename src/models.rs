use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last known position as reported by the router's GPS status tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GpsReading {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

/// Wire format of the GPS topic. Existing consumers expect the `logitude` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsPayload {
    #[serde(rename = "logitude")]
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl From<GpsReading> for GpsPayload {
    fn from(reading: GpsReading) -> Self {
        Self {
            longitude: reading.longitude,
            latitude: reading.latitude,
        }
    }
}

impl GpsReading {
    /// Interprets a raw data source value; `None` when it carries no position.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let reading: GpsReading = serde_json::from_value(value).ok()?;
        if reading.longitude.is_none() && reading.latitude.is_none() {
            return None;
        }
        Some(reading)
    }
}

/// A message queued for one short-lived broker connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: rumqttc::QoS,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: rumqttc::QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
        }
    }
}

/// Encodes a scalar device value: strings go out as raw text, anything else as JSON,
/// and a missing value as an empty payload.
pub fn scalar_payload(value: Option<Value>) -> Vec<u8> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(text)) => text.into_bytes(),
        Some(other) => other.to_string().into_bytes(),
    }
}
