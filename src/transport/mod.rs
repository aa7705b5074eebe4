//! Transport abstraction.
//!
//! The watchdog never talks to a client library directly. A [`Transport`]
//! yields lifecycle and message events, and hands out a shareable
//! [`Publisher`] for the per-connection watchdog task.
//!
//! - [`ChannelTransport`]: in-memory, scripted from a [`ChannelBroker`]
//! - `MqttTransport` (feature `mqtt`): backed by `rumqttc`

mod channel;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use channel::{ChannelBroker, ChannelTransport, PublishedMessage};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttTransport, MqttTransportBuilder};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;

/// Reason code carried by a disconnect event.
///
/// Zero means a clean, requested disconnect; anything else is abnormal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisconnectReason {
    code: u8,
}

impl DisconnectReason {
    pub const CLEAN: DisconnectReason = DisconnectReason { code: 0 };

    /// Generic code for network failures that carry no broker reason.
    pub const UNSPECIFIED: DisconnectReason = DisconnectReason { code: 128 };

    pub const fn new(code: u8) -> Self {
        Self { code }
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn is_clean(&self) -> bool {
        self.code == 0
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    Connected,
    /// An inbound message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
    /// The connection ended.
    Disconnected(DisconnectReason),
}

/// Outbound half of a connection, shared with the watchdog task.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Publish a message.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransportError>;
}

/// A pub/sub connection driven by the supervisor.
///
/// After [`reconnect`](Transport::reconnect) returns `Ok` the connection is
/// established; no separate [`TransportEvent::Connected`] follows.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next event.
    async fn next_event(&mut self) -> TransportEvent;

    /// Make one attempt to re-establish the connection.
    async fn reconnect(&mut self) -> Result<(), TransportError>;

    /// Handle for subscribing and publishing on this connection.
    fn publisher(&self) -> Arc<dyn Publisher>;

    /// Human-readable description, used in logs.
    fn description(&self) -> &str;
}
