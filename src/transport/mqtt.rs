//! MQTT transport backed by `rumqttc`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use z2m_health::MqttTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MqttTransport::builder()
//!     .host("broker.local")
//!     .port(1883)
//!     .client_id("z2m-health")
//!     .credentials("watchdog", "secret")
//!     .keep_alive(Duration::from_secs(60))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tracing::{debug, trace};

use super::{DisconnectReason, Publisher, Transport, TransportEvent};
use crate::error::TransportError;

/// A single broker connection.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
    description: String,
}

impl MqttTransport {
    /// Create a new builder for configuring the transport.
    pub fn builder() -> MqttTransportBuilder {
        MqttTransportBuilder::default()
    }

    fn map_event(event: Event) -> Option<TransportEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => Some(TransportEvent::Connected),
            Event::Incoming(Packet::Publish(publish)) => Some(TransportEvent::Message {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
            }),
            Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect) => {
                Some(TransportEvent::Disconnected(DisconnectReason::CLEAN))
            }
            _ => None,
        }
    }

    fn map_error(error: &ConnectionError) -> DisconnectReason {
        match error {
            ConnectionError::ConnectionRefused(code) => DisconnectReason::new(*code as u8),
            _ => DisconnectReason::UNSPECIFIED,
        }
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("description", &self.description)
            .finish()
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.eventloop.poll().await {
                Ok(event) => {
                    trace!("MQTT event: {:?}", event);
                    if let Some(mapped) = Self::map_event(event) {
                        return mapped;
                    }
                }
                Err(e) => {
                    debug!("MQTT connection error: {}", e);
                    return TransportEvent::Disconnected(Self::map_error(&e));
                }
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        // Polling after an error makes the event loop dial the broker again.
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(event) => trace!("MQTT event while reconnecting: {:?}", event),
                Err(e) => return Err(TransportError::Connection(e.to_string())),
            }
        }
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(MqttPublisher {
            client: self.client.clone(),
        })
    }

    fn description(&self) -> &str {
        &self.description
    }
}

struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }
}

/// Builder for MqttTransport.
#[derive(Default)]
pub struct MqttTransportBuilder {
    host: Option<String>,
    port: Option<u16>,
    client_id: Option<String>,
    credentials: Option<(String, String)>,
    keep_alive: Option<Duration>,
    capacity: Option<usize>,
}

impl std::fmt::Debug for MqttTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransportBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field(
                "username",
                &self.credentials.as_ref().map(|(username, _)| username),
            )
            .field("keep_alive", &self.keep_alive)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl MqttTransportBuilder {
    /// Set the broker host (default: "localhost").
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the broker port (default: 1883).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the client id (default: "z2m-health").
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the keep-alive interval (default: 60s, minimum 5s).
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Set the request channel capacity (default: 64).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Build the transport. The connection is made lazily on the first
    /// [`Transport::next_event`].
    pub fn build(self) -> Result<MqttTransport, TransportError> {
        let host = self.host.unwrap_or_else(|| "localhost".to_string());
        let port = self.port.unwrap_or(1883);
        let client_id = self.client_id.unwrap_or_else(|| "z2m-health".to_string());
        let keep_alive = self.keep_alive.unwrap_or(Duration::from_secs(60));

        if keep_alive < Duration::from_secs(5) {
            return Err(TransportError::Connection(format!(
                "keep-alive must be at least 5s, got {:?}",
                keep_alive
            )));
        }

        let mut options = MqttOptions::new(client_id, host.clone(), port);
        options.set_keep_alive(keep_alive);
        if let Some((username, password)) = self.credentials {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, self.capacity.unwrap_or(64));

        Ok(MqttTransport {
            client,
            eventloop,
            description: format!("mqtt://{}:{}", host, port),
        })
    }
}
