use serde::Serialize;

use crate::error::{Error, Result};

/// A single sensor measurement ready to be forwarded.
///
/// Serializes to the ingestion API request body:
/// `{"sensorId": "...", "value": 1.5, "timestamp": 1700000000}`,
/// with `timestamp` omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    sensor_id: String,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

impl Reading {
    /// Create a reading.
    ///
    /// Fails if `sensor_id` is empty or `value` is NaN or infinite.
    /// A timestamp of `0` is treated as absent so the API applies its
    /// ingestion-time default.
    pub fn new(sensor_id: impl Into<String>, value: f64, timestamp: Option<i64>) -> Result<Self> {
        let sensor_id = sensor_id.into();
        if sensor_id.is_empty() {
            return Err(Error::InvalidReading("sensor id is empty".to_string()));
        }
        if !value.is_finite() {
            return Err(Error::InvalidReading(format!(
                "value {} is not a finite number",
                value
            )));
        }

        Ok(Self {
            sensor_id,
            value,
            timestamp: timestamp.filter(|ts| *ts != 0),
        })
    }

    /// Sensor identifier.
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// Measured value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Unix epoch seconds, if the source supplied one.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}
