use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker URL, e.g. "tcp://localhost:1883" or "mqtt://broker:1883".
    pub broker: String,

    /// MQTT client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Optional username for broker authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for broker authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Subscription QoS level (0, 1 or 2).
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Start with a clean session on every connect.
    #[serde(default = "default_true")]
    pub clean_session: bool,

    /// Upper bound for the initial connection attempt, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Grace period for flushing unsubscribe/disconnect on shutdown, in milliseconds.
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,

    /// Capacity of the client's outgoing request queue.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_client_id() -> String {
    "sensorlink-mqtt-bridge".to_string()
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_disconnect_grace_ms() -> u64 {
    2000
}

fn default_request_capacity() -> usize {
    64
}

impl MqttConfig {
    /// Create a configuration for the given broker with all defaults.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            client_id: default_client_id(),
            username: None,
            password: None,
            qos: default_qos(),
            keep_alive_secs: default_keep_alive_secs(),
            clean_session: true,
            connect_timeout_secs: default_connect_timeout_secs(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
            request_capacity: default_request_capacity(),
        }
    }

    /// Keep-alive interval as Duration.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Initial connection timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Shutdown grace period as Duration.
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        mqtt: MqttConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_parse_mqtt_config() {
        let json5 = r#"
        {
            mqtt: {
                broker: "tcp://broker.local:1883",
                client_id: "bridge-01",
                username: "sensors",
                password: "secret",
                qos: 2,
                keep_alive_secs: 15,
                clean_session: false,
            },
            logging: {
                level: "debug",
            },
        }
        "#;

        let config: Wrapper = parse_config(json5).unwrap();

        assert_eq!(config.mqtt.broker, "tcp://broker.local:1883");
        assert_eq!(config.mqtt.client_id, "bridge-01");
        assert_eq!(config.mqtt.username.as_deref(), Some("sensors"));
        assert_eq!(config.mqtt.qos, 2);
        assert_eq!(config.mqtt.keep_alive(), Duration::from_secs(15));
        assert!(!config.mqtt.clean_session);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_default_config() {
        let json5 = r#"{ mqtt: { broker: "tcp://localhost:1883" } }"#;
        let config: Wrapper = parse_config(json5).unwrap();

        assert_eq!(config.mqtt, MqttConfig::new("tcp://localhost:1883"));
        assert_eq!(config.mqtt.qos, 1);
        assert!(config.mqtt.clean_session);
        assert_eq!(config.mqtt.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.mqtt.disconnect_grace(), Duration::from_millis(2000));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_json_logging_format() {
        let json5 = r#"
        {
            mqtt: { broker: "tcp://localhost:1883" },
            logging: {
                level: "debug",
                format: "json",
            },
        }
        "#;

        let config: Wrapper = parse_config(json5).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_broker_is_an_error() {
        let result: Result<Wrapper> = parse_config("{ mqtt: {} }");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result: Result<Wrapper> = load_config("/nonexistent/bridge.json5");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("/nonexistent/bridge.json5"));
    }
}
