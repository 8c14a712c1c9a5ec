//! MQTT session lifecycle: connect, supervise, reconnect, disconnect.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;
use sensorlink_bridge_framework::{ConnectionState, Lifecycle};
use sensorlink_common::parse_qos;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::config::MqttBridgeConfig;
use crate::dispatcher::{MessageHandler, pump};
use crate::error::{ConnectError, TransportError};
use crate::transport::{BusEvent, BusTransport, InboundMessage};

/// Tunables for a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// QoS used for every subscription.
    pub qos: QoS,
    /// Bound on the initial connection handshake.
    pub connect_timeout: Duration,
    /// Time allowed to flush unsubscribe/disconnect on shutdown.
    pub disconnect_grace: Duration,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
    /// Capacity of the queue between the supervisor and the pump.
    pub inbound_capacity: usize,
    /// Maximum concurrent handler invocations.
    pub max_in_flight: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &MqttBridgeConfig) -> sensorlink_common::Result<Self> {
        Ok(Self {
            qos: parse_qos(config.mqtt.qos)?,
            connect_timeout: config.mqtt.connect_timeout(),
            disconnect_grace: config.mqtt.disconnect_grace(),
            backoff: config.reconnect.clone(),
            inbound_capacity: config.api.inbound_capacity,
            max_in_flight: config.api.max_in_flight,
        })
    }
}

/// Owns the bus session and feeds inbound messages to a handler.
///
/// After `connect` succeeds two tasks run until `disconnect`: a supervisor
/// that polls the transport (reconnecting with backoff when the session
/// drops) and a pump that runs the handler for each message.
pub struct ConnectionManager<T: BusTransport, H: MessageHandler> {
    topics: Vec<String>,
    settings: ConnectionSettings,
    handler: Arc<H>,
    transport: Option<T>,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: Option<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl<T: BusTransport, H: MessageHandler> ConnectionManager<T, H> {
    pub fn new(
        transport: T,
        topics: Vec<String>,
        settings: ConnectionSettings,
        handler: Arc<H>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            topics,
            settings,
            handler,
            transport: Some(transport),
            state: Arc::new(state),
            shutdown: None,
            supervisor: None,
            pump: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Establish the session, subscribe to every topic and start the
    /// background tasks.
    ///
    /// A failed or timed-out first attempt is not retried; the transport is
    /// kept so the caller may try again.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.state() != ConnectionState::Disconnected || self.shutdown.is_some() {
            return Err(ConnectError::AlreadyConnected);
        }
        let mut transport = self.transport.take().ok_or(ConnectError::SessionClosed)?;

        set_state(&self.state, ConnectionState::Connecting);
        info!(topics = self.topics.len(), "Connecting to MQTT broker");

        let timeout = self.settings.connect_timeout;
        let handshake = match tokio::time::timeout(timeout, wait_for_connack(&mut transport)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectError::ConnectFailed(e)),
            Err(_) => Err(ConnectError::ConnectTimeout(timeout)),
        };
        let subscribed = handshake.and_then(|()| {
            subscribe_all(&mut transport, &self.topics, self.settings.qos)
                .map_err(|(topic, source)| ConnectError::Subscribe { topic, source })
        });
        if let Err(e) = subscribed {
            self.transport = Some(transport);
            set_state(&self.state, ConnectionState::Disconnected);
            return Err(e);
        }

        set_state(&self.state, ConnectionState::Connected);
        info!(topics = ?self.topics, "Connected to MQTT broker");

        let (inbound_tx, inbound_rx) = mpsc::channel(self.settings.inbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.pump = Some(tokio::spawn(pump(
            inbound_rx,
            self.handler.clone(),
            self.settings.max_in_flight,
        )));

        let supervisor = Supervisor {
            transport,
            topics: self.topics.clone(),
            qos: self.settings.qos,
            disconnect_grace: self.settings.disconnect_grace,
            backoff: Backoff::new(self.settings.backoff.clone()),
            state: self.state.clone(),
            inbound: inbound_tx,
            shutdown: shutdown_rx,
            pending: None,
        };
        self.supervisor = Some(tokio::spawn(supervisor.run()));
        self.shutdown = Some(shutdown_tx);

        Ok(())
    }

    /// Stop the session and wait for in-flight messages.
    ///
    /// No-op if not connected.
    pub async fn disconnect(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };

        info!("Disconnecting from MQTT broker");
        if shutdown.send(true).is_err() {
            debug!("MQTT supervisor already stopped");
        }

        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "MQTT supervisor task failed");
            }
        }
        if let Some(handle) = self.pump.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Inbound pump task failed");
            }
        }

        set_state(&self.state, ConnectionState::Disconnected);
        info!("Disconnected from MQTT broker");
    }
}

impl<T: BusTransport, H: MessageHandler> Lifecycle for ConnectionManager<T, H> {
    type Error = ConnectError;

    async fn connect(&mut self) -> Result<(), ConnectError> {
        ConnectionManager::connect(self).await
    }

    async fn disconnect(&mut self) {
        ConnectionManager::disconnect(self).await
    }
}

fn set_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let previous = state.send_replace(next);
    if previous != next {
        debug!(from = %previous, to = %next, "Connection state changed");
    }
}

async fn wait_for_connack<T: BusTransport>(transport: &mut T) -> Result<(), TransportError> {
    loop {
        match transport.poll().await? {
            BusEvent::ConnAck => return Ok(()),
            event => trace!(event = ?event, "Ignoring event before ConnAck"),
        }
    }
}

fn subscribe_all<T: BusTransport>(
    transport: &mut T,
    topics: &[String],
    qos: QoS,
) -> Result<(), (String, TransportError)> {
    for topic in topics {
        transport
            .subscribe(topic, qos)
            .map_err(|e| (topic.clone(), e))?;
        debug!(topic = %topic, qos = ?qos, "Subscribed");
    }
    Ok(())
}

/// Background task owning the transport while connected.
struct Supervisor<T: BusTransport> {
    transport: T,
    topics: Vec<String>,
    qos: QoS,
    disconnect_grace: Duration,
    backoff: Backoff,
    state: Arc<watch::Sender<ConnectionState>>,
    inbound: mpsc::Sender<InboundMessage>,
    shutdown: watch::Receiver<bool>,
    /// Topics still to resubscribe after a reconnect; `None` outside one.
    pending: Option<VecDeque<String>>,
}

impl<T: BusTransport> Supervisor<T> {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                event = self.transport.poll() => event,
            };

            match event {
                Ok(BusEvent::ConnAck) => self.on_reconnected(),
                Ok(BusEvent::Message(message)) => {
                    self.forward(message);
                    self.resubscribe_pending();
                }
                Ok(event) => {
                    trace!(event = ?event, "MQTT event");
                    self.resubscribe_pending();
                }
                Err(e) => {
                    self.pending = None;
                    if !self.on_connection_error(e).await {
                        break;
                    }
                }
            }
        }

        self.close().await;
    }

    fn forward(&self, message: InboundMessage) {
        match self.inbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(topic = %message.topic, "Inbound queue full, dropping message");
            }
            Err(TrySendError::Closed(message)) => {
                warn!(topic = %message.topic, "Inbound queue closed, dropping message");
            }
        }
    }

    fn on_reconnected(&mut self) {
        if *self.state.borrow() != ConnectionState::Reconnecting {
            return;
        }

        self.pending = Some(self.topics.iter().cloned().collect());
        self.resubscribe_pending();
    }

    /// Queue as many pending subscriptions as the request queue takes.
    ///
    /// Each poll drains the queue, so the rest go out after the next event.
    /// The session counts as connected only once every topic is queued.
    fn resubscribe_pending(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        while let Some(topic) = pending.front() {
            if let Err(e) = self.transport.subscribe(topic, self.qos) {
                debug!(
                    topic = %topic,
                    error = %e,
                    remaining = pending.len(),
                    "Resubscribe deferred until the request queue drains"
                );
                return;
            }
            debug!(topic = %topic, qos = ?self.qos, "Resubscribed");
            pending.pop_front();
        }
        self.pending = None;

        info!(
            attempts = self.backoff.attempt(),
            topics = self.topics.len(),
            "Reconnected to MQTT broker"
        );
        self.backoff.reset();
        set_state(&self.state, ConnectionState::Connected);
    }

    /// Wait out the next backoff delay. Returns false if shutdown was requested.
    async fn on_connection_error(&mut self, error: TransportError) -> bool {
        if *self.state.borrow() == ConnectionState::Reconnecting {
            debug!(error = %error, "Reconnect attempt failed");
        } else {
            warn!(error = %error, "Connection to MQTT broker lost");
            set_state(&self.state, ConnectionState::Reconnecting);
        }

        let attempt = self.backoff.attempt() + 1;
        let delay = self.backoff.next_delay();
        warn!(
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to MQTT broker"
        );

        tokio::select! {
            biased;
            _ = self.shutdown.changed() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn close(self) {
        let Supervisor {
            mut transport,
            topics,
            disconnect_grace,
            state,
            inbound,
            ..
        } = self;

        // Closes the pump once queued messages are handled.
        drop(inbound);

        if *state.borrow() != ConnectionState::Connected {
            debug!("No live MQTT session to close");
            return;
        }

        for topic in &topics {
            if let Err(e) = transport.unsubscribe(topic) {
                warn!(topic = %topic, error = %e, "Failed to unsubscribe");
            }
        }
        if let Err(e) = transport.disconnect() {
            warn!(error = %e, "Failed to send MQTT disconnect");
            return;
        }

        let drain = async {
            loop {
                match transport.poll().await {
                    Ok(BusEvent::Disconnected) | Err(_) => break,
                    Ok(event) => trace!(event = ?event, "Draining MQTT event"),
                }
            }
        };
        if tokio::time::timeout(disconnect_grace, drain).await.is_err() {
            warn!(
                grace_ms = disconnect_grace.as_millis() as u64,
                "MQTT disconnect did not complete within grace period"
            );
        }
    }
}
