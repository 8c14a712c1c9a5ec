//! SensorLink Common Library
//!
//! This crate provides shared types and utilities for SensorLink bridges:
//!
//! - [`reading`] - The sensor reading data model (`Reading`)
//! - [`serialization`] - JSON/CBOR payload decoding and JSON body encoding
//! - [`config`] - Configuration loading (JSON5 format), MQTT and logging settings
//! - [`session`] - MQTT client options construction
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod reading;
pub mod serialization;
pub mod session;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use reading::Reading;
pub use serialization::{Format, JSON_CONTENT_TYPE, decode, decode_auto, encode_json};
pub use session::{BrokerAddress, mqtt_options, parse_qos};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. An unparseable
/// level falls back to `info` and is reported once the subscriber is live.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// # Example
///
/// ```ignore
/// use sensorlink_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let mut invalid_level = None;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        filter_for_level(&config.level).unwrap_or_else(|e| {
            invalid_level = Some(e);
            EnvFilter::new("info")
        })
    });

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    if let Some(error) = invalid_level {
        tracing::warn!(level = %config.level, %error, "Invalid log level, using info");
    }

    Ok(())
}

/// Build an `EnvFilter` from a configured level.
///
/// Plain levels (`debug`, `WARN`, `off`) are checked strictly; anything
/// containing `=` or `,` is treated as a full directive string.
fn filter_for_level(level: &str) -> std::result::Result<tracing_subscriber::EnvFilter, String> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::filter::LevelFilter;

    if level.contains('=') || level.contains(',') {
        return EnvFilter::try_new(level).map_err(|e| e.to_string());
    }

    let parsed: LevelFilter = level.trim().parse().map_err(|e| format!("{}", e))?;
    Ok(EnvFilter::new(parsed.to_string()))
}
