//! Bus transport abstraction and its MQTT implementation.

use std::future::Future;

use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use sensorlink_common::{MqttConfig, mqtt_options};

use crate::error::TransportError;

/// One message delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Events surfaced by [`BusTransport::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The broker acknowledged a (re)connect.
    ConnAck,
    /// A message arrived on a subscribed topic.
    Message(InboundMessage),
    /// The broker acknowledged a subscription.
    SubAck,
    /// Our DISCONNECT has been written to the socket.
    Disconnected,
    /// Anything else (pings, acks of our own requests).
    Other,
}

/// A message bus session driven by repeated polling.
///
/// `poll` both drives I/O and reconnects: after it returns an error, the
/// next call attempts a fresh connection. The request methods only queue
/// work for the next polls and never block.
pub trait BusTransport: Send + 'static {
    /// Drive the session until the next event.
    fn poll(&mut self) -> impl Future<Output = Result<BusEvent, TransportError>> + Send;

    /// Queue a subscription request.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Queue an unsubscribe request.
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Queue a graceful disconnect.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// [`BusTransport`] backed by `rumqttc`.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttTransport {
    /// Create a transport from the MQTT configuration.
    ///
    /// No network activity happens until the first `poll`.
    pub fn new(config: &MqttConfig) -> sensorlink_common::Result<Self> {
        let options = mqtt_options(config)?;
        let (client, eventloop) = AsyncClient::new(options, config.request_capacity);
        Ok(Self { client, eventloop })
    }
}

impl BusTransport for MqttTransport {
    async fn poll(&mut self) -> Result<BusEvent, TransportError> {
        let event = self
            .eventloop
            .poll()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(match event {
            Event::Incoming(Packet::ConnAck(_)) => BusEvent::ConnAck,
            Event::Incoming(Packet::Publish(publish)) => BusEvent::Message(InboundMessage {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Event::Incoming(Packet::SubAck(_)) => BusEvent::SubAck,
            Event::Outgoing(Outgoing::Disconnect) => BusEvent::Disconnected,
            other => {
                tracing::trace!(event = ?other, "mqtt event");
                BusEvent::Other
            }
        })
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, qos)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.client
            .try_disconnect()
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}
