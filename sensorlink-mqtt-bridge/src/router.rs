//! Topic routing and payload decoding.

use std::collections::HashMap;

use serde::Deserialize;
use sensorlink_common::{Reading, decode_auto};

use crate::config::TopicBinding;
use crate::error::DecodeError;

/// Payload schema published by sensors.
#[derive(Debug, Deserialize)]
struct SensorPayload {
    value: Option<f64>,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Maps bus messages to readings using the static topic bindings.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    bindings: HashMap<String, String>,
}

impl MessageRouter {
    /// Build the routing table from the configured bindings.
    pub fn new(bindings: &[TopicBinding]) -> Self {
        Self {
            bindings: bindings
                .iter()
                .map(|b| (b.topic.clone(), b.sensor_id.clone()))
                .collect(),
        }
    }

    /// Sensor bound to `topic`, if any.
    pub fn sensor_for(&self, topic: &str) -> Option<&str> {
        self.bindings.get(topic).map(String::as_str)
    }

    /// Number of bound topics.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Decode one message into a reading.
    ///
    /// Payloads are JSON or CBOR objects with a numeric `value` and an
    /// optional integer `timestamp` (unix seconds).
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Result<Reading, DecodeError> {
        let sensor_id = self
            .sensor_for(topic)
            .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

        let malformed = |reason: String| DecodeError::MalformedPayload {
            topic: topic.to_string(),
            reason,
        };

        let parsed: SensorPayload = decode_auto(payload).map_err(|e| malformed(e.to_string()))?;
        let value = parsed
            .value
            .ok_or_else(|| malformed("missing numeric 'value' field".to_string()))?;

        Reading::new(sensor_id, value, parsed.timestamp).map_err(|e| malformed(e.to_string()))
    }
}
