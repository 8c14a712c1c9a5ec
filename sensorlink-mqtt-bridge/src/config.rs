//! MQTT bridge configuration.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sensorlink_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, MqttConfig, Result};
use sensorlink_common::{BrokerAddress, parse_qos};

use crate::backoff::BackoffConfig;

/// Complete MQTT bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBridgeConfig {
    /// MQTT broker connection settings.
    pub mqtt: MqttConfig,

    /// Ingestion API settings.
    pub api: ApiConfig,

    /// Reconnect backoff settings.
    #[serde(default)]
    pub reconnect: BackoffConfig,

    /// Topic to sensor bindings.
    pub topics: Vec<TopicBinding>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// REST ingestion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint readings are POSTed to.
    pub endpoint: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of requests in flight at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Inbound messages buffered while all request slots are busy.
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_in_flight() -> usize {
    16
}

fn default_inbound_capacity() -> usize {
    256
}

impl ApiConfig {
    /// Get the request timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Binds one MQTT topic to the sensor its readings belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBinding {
    /// Exact MQTT topic (no wildcards).
    pub topic: String,

    /// Sensor identifier sent to the API.
    pub sensor_id: String,
}

impl TopicBinding {
    pub fn new(topic: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            sensor_id: sensor_id.into(),
        }
    }
}

impl MqttBridgeConfig {
    /// Validate the configuration.
    pub fn validate_config(&self) -> anyhow::Result<()> {
        BrokerAddress::parse(&self.mqtt.broker)?;
        parse_qos(self.mqtt.qos)?;

        if self.mqtt.client_id.is_empty() {
            anyhow::bail!("mqtt.client_id cannot be empty");
        }
        if self.mqtt.keep_alive_secs == 0 {
            anyhow::bail!("mqtt.keep_alive_secs must be > 0");
        }
        if self.mqtt.connect_timeout_secs == 0 {
            anyhow::bail!("mqtt.connect_timeout_secs must be > 0");
        }
        if self.mqtt.request_capacity == 0 {
            anyhow::bail!("mqtt.request_capacity must be > 0");
        }

        let endpoint = Url::parse(&self.api.endpoint)
            .map_err(|e| anyhow::anyhow!("api.endpoint '{}' is invalid: {}", self.api.endpoint, e))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("api.endpoint must use http or https");
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be > 0");
        }
        if self.api.max_in_flight == 0 {
            anyhow::bail!("api.max_in_flight must be > 0");
        }
        if self.api.inbound_capacity == 0 {
            anyhow::bail!("api.inbound_capacity must be > 0");
        }

        self.reconnect.validate()?;

        if self.topics.is_empty() {
            anyhow::bail!("At least one topic binding must be configured");
        }

        let mut seen = HashSet::new();
        for (i, binding) in self.topics.iter().enumerate() {
            if binding.topic.is_empty() {
                anyhow::bail!("Topic binding {} has an empty topic", i);
            }
            if binding.sensor_id.is_empty() {
                anyhow::bail!("Topic binding {} ('{}') has an empty sensor_id", i, binding.topic);
            }
            if binding.topic.contains(['+', '#']) {
                anyhow::bail!(
                    "Topic binding {} ('{}') must not contain MQTT wildcards",
                    i,
                    binding.topic
                );
            }
            if !seen.insert(binding.topic.as_str()) {
                anyhow::bail!("Topic '{}' is bound more than once", binding.topic);
            }
        }

        // Every SUBSCRIBE, or every UNSUBSCRIBE plus the DISCONNECT, is queued
        // before the event loop gets to drain any of them.
        if self.topics.len() >= self.mqtt.request_capacity {
            anyhow::bail!(
                "mqtt.request_capacity ({}) must exceed the number of topics ({})",
                self.mqtt.request_capacity,
                self.topics.len()
            );
        }

        Ok(())
    }

    /// Topics to subscribe to, in configuration order.
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|b| b.topic.clone()).collect()
    }
}

impl BridgeConfig for MqttBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        self.validate_config()
            .map_err(|e| BridgeError::validation(e.to_string()))
    }
}
