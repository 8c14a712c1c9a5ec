//! MQTT to REST bridge for sensor telemetry.
//!
//! Subscribes to a fixed set of MQTT topics, decodes each message into a
//! [`Reading`](sensorlink_common::Reading) and POSTs it to an ingestion API.
//!
//! # Payload Format
//!
//! Each topic is bound to one sensor. Payloads are JSON (or CBOR) objects:
//! ```text
//! {"value": 42.5, "timestamp": 1700000000}
//! ```
//!
//! and are forwarded as:
//! ```text
//! POST <endpoint>  {"sensorId": "temp-01", "value": 42.5, "timestamp": 1700000000}
//! ```

pub mod backoff;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod forwarder;
pub mod router;
pub mod transport;

pub use config::{ApiConfig, MqttBridgeConfig, TopicBinding};
pub use connection::{ConnectionManager, ConnectionSettings};
pub use dispatcher::{Dispatcher, MessageHandler, StatsSnapshot, pump};
pub use error::{ConnectError, DecodeError, ForwardError, TransportError};
pub use forwarder::{Acceptance, ForwardOutcome, ForwardingClient, classify};
pub use router::MessageRouter;
pub use transport::{BusEvent, BusTransport, InboundMessage, MqttTransport};
