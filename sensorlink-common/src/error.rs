use thiserror::Error;

/// Common error type for SensorLink components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid broker address '{address}': {reason}")]
    BrokerAddress { address: String, reason: String },

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR serialization error: {0}")]
    Cbor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using SensorLink's Error.
pub type Result<T> = std::result::Result<T, Error>;
