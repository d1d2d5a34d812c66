use dotenvy::dotenv;
use rumqttc::QoS;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mqtt_server: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_qos: u8,
    pub mqtt_keep_alive_secs: u64,
    pub mqtt_reconnect_delay_ms: u64,

    pub gps_topic: String,
    pub modem_temp_topic: String,
    pub wan_connection_state_topic: String,

    pub publish_interval_secs: u64,
    pub publish_timeout_secs: u64,
    pub run_timeout_secs: u64,

    pub data_source_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

/// Parses `key` when set, otherwise returns `default`.
fn var_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::ParsingError(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt_server: "test.mosquitto.org".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "router-mqtt-app".to_string(),
            mqtt_qos: 0,
            mqtt_keep_alive_secs: 60,
            mqtt_reconnect_delay_ms: 5000,
            gps_topic: "/status/gps/lastpos".to_string(),
            modem_temp_topic: "/status/system/modem_temp".to_string(),
            wan_connection_state_topic: "/status/wan/connection_state".to_string(),
            publish_interval_secs: 10,
            publish_timeout_secs: 30,
            run_timeout_secs: 36000,
            data_source_url: "http://127.0.0.1/api".to_string(),
        }
    }
}

impl Config {
    /// Validate ranges and values the MQTT client would otherwise reject at runtime.
    fn validate(&self) -> Result<(), ConfigError> {
        const MIN_DELAY: u64 = 100;
        const MAX_DELAY: u64 = 1_000_000;

        if !(MIN_DELAY..=MAX_DELAY).contains(&self.mqtt_reconnect_delay_ms) {
            return Err(ConfigError::ParsingError(format!(
                "MQTT_RECONNECT_DELAY_MS must be between {} and {} ms",
                MIN_DELAY, MAX_DELAY
            )));
        }

        // rumqttc panics on these client ids
        if self.mqtt_client_id.is_empty() || self.mqtt_client_id.starts_with(' ') {
            return Err(ConfigError::MissingOrInvalid("MQTT_CLIENT_ID".to_string()));
        }

        if self.mqtt_server.trim().is_empty() {
            return Err(ConfigError::MissingOrInvalid("MQTT_SERVER".to_string()));
        }

        if self.mqtt_qos > 2 {
            return Err(ConfigError::ParsingError(
                "MQTT_QOS must be 0, 1 or 2".to_string(),
            ));
        }

        if self.mqtt_keep_alive_secs < 5 {
            return Err(ConfigError::ParsingError(
                "MQTT_KEEP_ALIVE_SECS must be at least 5".to_string(),
            ));
        }

        if self.publish_interval_secs == 0 || self.publish_timeout_secs == 0 {
            return Err(ConfigError::ParsingError(
                "PUBLISH_INTERVAL_SECS and PUBLISH_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        for (name, topic) in [
            ("GPS_TOPIC", &self.gps_topic),
            ("MODEM_TEMP_TOPIC", &self.modem_temp_topic),
            ("WAN_CONNECTION_STATE_TOPIC", &self.wan_connection_state_topic),
        ] {
            if topic.is_empty() || topic.contains(['+', '#']) {
                return Err(ConfigError::MissingOrInvalid(name.to_string()));
            }
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file

        let defaults = Self::default();
        let text = |key: &str, default: &str| env::var(key).unwrap_or_else(|_| default.to_string());

        let config = Self {
            // MQTT Configuration
            mqtt_server: text("MQTT_SERVER", &defaults.mqtt_server),
            mqtt_port: var_or("MQTT_PORT", defaults.mqtt_port)?,
            mqtt_client_id: text("MQTT_CLIENT_ID", &defaults.mqtt_client_id),
            mqtt_qos: var_or("MQTT_QOS", defaults.mqtt_qos)?,
            mqtt_keep_alive_secs: var_or("MQTT_KEEP_ALIVE_SECS", defaults.mqtt_keep_alive_secs)?,
            mqtt_reconnect_delay_ms: var_or("MQTT_RECONNECT_DELAY_MS", defaults.mqtt_reconnect_delay_ms)?,

            // MQTT Topics, also used as data source keys
            gps_topic: text("GPS_TOPIC", &defaults.gps_topic),
            modem_temp_topic: text("MODEM_TEMP_TOPIC", &defaults.modem_temp_topic),
            wan_connection_state_topic: text(
                "WAN_CONNECTION_STATE_TOPIC",
                &defaults.wan_connection_state_topic,
            ),

            publish_interval_secs: var_or("PUBLISH_INTERVAL_SECS", defaults.publish_interval_secs)?,
            publish_timeout_secs: var_or("PUBLISH_TIMEOUT_SECS", defaults.publish_timeout_secs)?,
            run_timeout_secs: var_or("RUN_TIMEOUT_SECS", defaults.run_timeout_secs)?,

            data_source_url: text("DATA_SOURCE_URL", &defaults.data_source_url),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn qos(&self) -> QoS {
        match self.mqtt_qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    /// The fixed topic set, in subscription order.
    pub fn topics(&self) -> [&str; 3] {
        [
            self.gps_topic.as_str(),
            self.modem_temp_topic.as_str(),
            self.wan_connection_state_topic.as_str(),
        ]
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.mqtt_reconnect_delay_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
