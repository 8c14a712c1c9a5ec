//! SensorLink Bridge Framework
//!
//! Common abstractions for building bridges that consume a message bus and
//! forward what they receive somewhere else.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`Lifecycle`] trait implemented by the component that owns the bus session
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`ConnectionState`] for standardized session status reporting
//!
//! # Example
//!
//! ```ignore
//! use sensorlink_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
//!     let mut session = MySession::new(runner.config());
//!
//!     // Connect, run until Ctrl+C or SIGTERM, then disconnect
//!     runner.run(&mut session).await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod runner;
mod status;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use runner::{BridgeRunner, Lifecycle, shutdown_signal};
pub use status::ConnectionState;

// Re-export commonly used types from sensorlink-common
pub use sensorlink_common::{LogFormat, LoggingConfig, MqttConfig, Reading};
