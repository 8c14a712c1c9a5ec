//! Error types for the MQTT bridge.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by the bus transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection to the broker failed or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A request could not be queued to the client.
    #[error("request error: {0}")]
    Request(String),
}

/// Failure to establish the initial bus session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The broker refused or could not be reached.
    #[error("failed to connect to MQTT broker: {0}")]
    ConnectFailed(#[source] TransportError),

    /// No acknowledgement arrived in time.
    #[error("timed out after {0:?} waiting for MQTT broker")]
    ConnectTimeout(Duration),

    /// A subscribe request could not be issued.
    #[error("failed to subscribe to '{topic}': {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: TransportError,
    },

    /// `connect` was called while a session is held.
    #[error("bridge is already connected")]
    AlreadyConnected,

    /// The transport is no longer available.
    #[error("MQTT session is closed and cannot be reused")]
    SessionClosed,
}

/// A message that cannot be turned into a reading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No binding exists for the topic.
    #[error("no sensor bound to topic '{0}'")]
    UnknownTopic(String),

    /// The payload is not a usable reading.
    #[error("malformed payload on '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },
}

/// A reading the ingestion API did not accept.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// Permanent rejection; the reading must not be retried.
    #[error("{}", rejected_message(*.status, .reason))]
    Rejected { status: u16, reason: String },

    /// The request never completed.
    #[error("failed to send request: {cause}")]
    Transport { cause: String },
}

fn rejected_message(status: u16, reason: &str) -> String {
    match status {
        400 => format!("bad request: {}", reason),
        _ => reason.to_string(),
    }
}

impl ForwardError {
    /// Only transport failures are worth retrying at a higher layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForwardError::Transport { .. })
    }
}
