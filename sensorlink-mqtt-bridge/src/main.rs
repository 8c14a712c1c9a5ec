//! MQTT to REST bridge for sensor telemetry.
//!
//! Subscribes to the configured MQTT topics and forwards every reading to
//! the ingestion API.

use std::sync::Arc;

use anyhow::Result;
use sensorlink_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
use sensorlink_mqtt_bridge::{
    ConnectionManager, ConnectionSettings, Dispatcher, ForwardingClient, MessageRouter,
    MqttBridgeConfig, MqttTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = BridgeArgs::parse_with_default("mqtt-bridge.json5");

    // Load and validate configuration
    let config = MqttBridgeConfig::load(&args.config)?;

    // Initialize logging
    let runner = BridgeRunner::new_with_args("mqtt-rest", config, Some(&args))?;
    let config = runner.config();

    tracing::info!(
        broker = %config.mqtt.broker,
        endpoint = %config.api.endpoint,
        topics = config.topics.len(),
        "Configuration loaded"
    );

    let router = MessageRouter::new(&config.topics);
    let client = ForwardingClient::new(&config.api.endpoint, config.api.timeout())?;
    let dispatcher = Arc::new(Dispatcher::new(router, client));

    let transport = MqttTransport::new(&config.mqtt)?;
    let settings = ConnectionSettings::from_config(config)?;
    let mut manager =
        ConnectionManager::new(transport, config.topic_names(), settings, dispatcher.clone());

    // Connect, run until Ctrl+C or SIGTERM, then drain and disconnect
    runner.run(&mut manager).await?;

    let stats = dispatcher.stats();
    tracing::info!(
        received = stats.received,
        dropped = stats.dropped,
        accepted = stats.accepted,
        warned = stats.warned,
        rejected = stats.rejected,
        transport_failures = stats.transport_failures,
        thresholds_exceeded = stats.thresholds_exceeded,
        "Final statistics"
    );

    Ok(())
}
