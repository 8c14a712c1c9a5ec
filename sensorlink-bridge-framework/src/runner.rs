//! Bridge runner for lifecycle management.

use std::future::Future;

use sensorlink_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// A component owning a bus session that can be started and stopped.
///
/// `connect` is called once at startup; a failure there is fatal for the
/// bridge. `disconnect` is called once at shutdown and must be idempotent.
pub trait Lifecycle: Send {
    /// Error returned when the session cannot be established.
    type Error: std::fmt::Display + Send;

    /// Establish the session.
    fn connect(&mut self) -> impl Future<Output = std::result::Result<(), Self::Error>> + Send;

    /// Tear the session down, waiting for in-flight work.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}

/// Bridge runner that manages the lifecycle of a bridge.
///
/// Handles:
/// - Logging initialization (with optional CLI level override)
/// - Connecting the bus session
/// - Graceful shutdown on Ctrl+C or SIGTERM
///
/// # Example
///
/// ```ignore
/// use sensorlink_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
///     let mut session = MySession::new(runner.config());
///
///     runner.run(&mut session).await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner, initializing logging from the config.
    pub fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None)
    }

    /// Create a new bridge runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        Ok(Self {
            name,
            version,
            config,
        })
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Run the bridge until Ctrl+C or SIGTERM is received.
    ///
    /// This will:
    /// 1. Connect the session (returning an error if that fails)
    /// 2. Wait for a shutdown signal
    /// 3. Disconnect the session
    pub async fn run<L: Lifecycle>(&self, session: &mut L) -> Result<()> {
        drive(&self.name, session, shutdown_signal()).await
    }

    /// Run the bridge until `shutdown` completes.
    pub async fn run_until<L, F>(&self, session: &mut L, shutdown: F) -> Result<()>
    where
        L: Lifecycle,
        F: Future<Output = ()>,
    {
        drive(&self.name, session, shutdown).await
    }
}

async fn drive<L, F>(name: &str, session: &mut L, shutdown: F) -> Result<()>
where
    L: Lifecycle,
    F: Future<Output = ()>,
{
    session
        .connect()
        .await
        .map_err(|e| BridgeError::connect(e.to_string()))?;

    tracing::info!(bridge = %name, "Bridge is running. Press Ctrl+C to exit.");

    shutdown.await;

    tracing::info!(bridge = %name, "Shutting down bridge...");
    session.disconnect().await;
    tracing::info!(bridge = %name, "Bridge stopped");

    Ok(())
}

/// Resolve when the process receives Ctrl+C or (on Unix) SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
