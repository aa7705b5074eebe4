//! In-memory transport.
//!
//! Events are pushed through a [`ChannelBroker`] and read by the supervisor
//! through [`ChannelTransport`]. Subscriptions and publishes made by the
//! watchdog come back out of the broker, so a test (or an embedding that
//! already owns a bus connection) can drive the whole watchdog without a
//! network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{DisconnectReason, Publisher, Transport, TransportEvent};
use crate::error::TransportError;

/// A message the watchdog published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

type ReconnectScript = Arc<Mutex<VecDeque<Result<(), String>>>>;

/// A transport fed from a [`ChannelBroker`].
///
/// # Example
///
/// ```
/// use z2m_health::{ChannelTransport, Transport, TransportEvent};
///
/// # tokio_test::block_on(async {
/// let (broker, mut transport) = ChannelTransport::create("test");
///
/// broker.connect();
/// broker.deliver("zigbee2mqtt/kitchen", "{}");
///
/// assert_eq!(transport.next_event().await, TransportEvent::Connected);
/// assert!(matches!(transport.next_event().await, TransportEvent::Message { .. }));
/// # });
/// ```
#[derive(Debug)]
pub struct ChannelTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    reconnects: ReconnectScript,
    reconnect_attempts: Arc<AtomicU32>,
    publisher: Arc<ChannelPublisher>,
    description: String,
}

impl ChannelTransport {
    /// Create a connected broker/transport pair.
    pub fn create(source_description: &str) -> (ChannelBroker, Self) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (subscription_tx, subscription_rx) = mpsc::unbounded_channel();
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        let reconnects: ReconnectScript = Arc::new(Mutex::new(VecDeque::new()));
        let reconnect_attempts = Arc::new(AtomicU32::new(0));
        let fail_publishes = Arc::new(AtomicBool::new(false));

        let publisher = Arc::new(ChannelPublisher {
            subscriptions: subscription_tx,
            published: published_tx,
            fail_publishes: fail_publishes.clone(),
        });

        let broker = ChannelBroker {
            events: event_tx,
            reconnects: reconnects.clone(),
            reconnect_attempts: reconnect_attempts.clone(),
            subscriptions: subscription_rx,
            published: published_rx,
            fail_publishes,
        };

        let transport = Self {
            events: event_rx,
            reconnects,
            reconnect_attempts,
            publisher,
            description: format!("channel: {}", source_description),
        };

        (broker, transport)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn next_event(&mut self) -> TransportEvent {
        // A dropped broker is indistinguishable from a requested disconnect.
        self.events
            .recv()
            .await
            .unwrap_or(TransportEvent::Disconnected(DisconnectReason::CLEAN))
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        match self.reconnects.lock().pop_front() {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(TransportError::Connection(reason)),
            None => Err(TransportError::Connection("broker unreachable".to_string())),
        }
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        self.publisher.clone()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Debug)]
struct ChannelPublisher {
    subscriptions: mpsc::UnboundedSender<String>,
    published: mpsc::UnboundedSender<PublishedMessage>,
    fail_publishes: Arc<AtomicBool>,
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.subscriptions
            .send(filter.to_string())
            .map_err(|_| TransportError::Closed)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), TransportError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("broker rejected publish".to_string()));
        }
        self.published
            .send(PublishedMessage {
                topic: topic.to_string(),
                payload,
                retain,
            })
            .map_err(|_| TransportError::Closed)
    }
}

/// The scripting end of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelBroker {
    events: mpsc::UnboundedSender<TransportEvent>,
    reconnects: ReconnectScript,
    reconnect_attempts: Arc<AtomicU32>,
    subscriptions: mpsc::UnboundedReceiver<String>,
    published: mpsc::UnboundedReceiver<PublishedMessage>,
    fail_publishes: Arc<AtomicBool>,
}

impl ChannelBroker {
    /// Acknowledge the connection.
    pub fn connect(&self) {
        self.send(TransportEvent::Connected);
    }

    /// Deliver an inbound message.
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.send(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        });
    }

    /// Drop the connection with the given reason code.
    pub fn disconnect(&self, code: u8) {
        self.send(TransportEvent::Disconnected(DisconnectReason::new(code)));
    }

    /// Let the next reconnect attempts fail `failures` times, then succeed.
    pub fn accept_reconnect_after(&self, failures: u32) {
        let mut script = self.reconnects.lock();
        for attempt in 0..failures {
            script.push_back(Err(format!("connection refused (attempt {})", attempt + 1)));
        }
        script.push_back(Ok(()));
    }

    /// Number of reconnect attempts made so far.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Wait for the next subscription request.
    pub async fn next_subscription(&mut self) -> Option<String> {
        self.subscriptions.recv().await
    }

    /// Wait for the next published message.
    pub async fn next_published(&mut self) -> Option<PublishedMessage> {
        self.published.recv().await
    }

    /// The next published message, if one is already queued.
    pub fn try_next_published(&mut self) -> Option<PublishedMessage> {
        self.published.try_recv().ok()
    }

    fn send(&self, event: TransportEvent) {
        // The transport side may already be gone during teardown.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_in_order() {
        let (broker, mut transport) = ChannelTransport::create("test");

        broker.connect();
        broker.deliver("a/b", b"payload".to_vec());
        broker.disconnect(5);

        assert_eq!(transport.next_event().await, TransportEvent::Connected);
        assert_eq!(
            transport.next_event().await,
            TransportEvent::Message {
                topic: "a/b".to_string(),
                payload: b"payload".to_vec(),
            }
        );
        assert_eq!(
            transport.next_event().await,
            TransportEvent::Disconnected(DisconnectReason::new(5))
        );
    }

    #[tokio::test]
    async fn test_dropped_broker_is_clean_disconnect() {
        let (broker, mut transport) = ChannelTransport::create("test");
        drop(broker);

        assert_eq!(
            transport.next_event().await,
            TransportEvent::Disconnected(DisconnectReason::CLEAN)
        );
    }

    #[tokio::test]
    async fn test_scripted_reconnects() {
        let (broker, mut transport) = ChannelTransport::create("test");
        broker.accept_reconnect_after(2);

        assert!(transport.reconnect().await.is_err());
        assert!(transport.reconnect().await.is_err());
        assert!(transport.reconnect().await.is_ok());
        // Script exhausted: unreachable again.
        assert!(transport.reconnect().await.is_err());
        assert_eq!(broker.reconnect_attempts(), 4);
    }

    #[tokio::test]
    async fn test_publisher_round_trip() {
        let (mut broker, transport) = ChannelTransport::create("test");
        let publisher = transport.publisher();

        publisher.subscribe("zigbee2mqtt/#").await.unwrap();
        publisher
            .publish("zigbee2mqtt/healthz", b"{}".to_vec(), true)
            .await
            .unwrap();

        assert_eq!(
            broker.next_subscription().await.as_deref(),
            Some("zigbee2mqtt/#")
        );
        let published = broker.next_published().await.unwrap();
        assert_eq!(published.topic, "zigbee2mqtt/healthz");
        assert!(published.retain);
        assert!(broker.try_next_published().is_none());
    }

    #[tokio::test]
    async fn test_failing_publishes() {
        let (broker, transport) = ChannelTransport::create("test");
        broker.fail_publishes(true);

        let result = transport
            .publisher()
            .publish("zigbee2mqtt/healthz", Vec::new(), true)
            .await;
        assert!(matches!(result, Err(TransportError::Publish(_))));
    }

    #[test]
    fn test_description() {
        let (_broker, transport) = ChannelTransport::create("unit");
        assert_eq!(transport.description(), "channel: unit");
    }
}
