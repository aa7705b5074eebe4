//! Connection lifecycle handling.
//!
//! [`LivenessMonitor`] reacts to transport events: it records device
//! sightings, and owns the per-connection watchdog task. A new task is only
//! started on a fresh connect, and the previous one is cancelled and awaited
//! first, so two loops never run at once.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::WatchdogConfig;
use crate::error::TransportError;
use crate::heartbeat::HeartbeatWriter;
use crate::liveness::{LivenessRegistry, TopicFilter};
use crate::transport::{DisconnectReason, Publisher};
use crate::watchdog::{Watchdog, WatchdogSettings};

/// What to do after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectAction {
    Reconnect,
    Exit,
}

/// Callbacks invoked by the transport driver.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// The connection is (re-)established.
    async fn on_connect(&self, publisher: Arc<dyn Publisher>) -> Result<(), TransportError>;

    /// An inbound message arrived. The payload is never inspected.
    fn on_message(&self, topic: &str, payload: &[u8]);

    /// The connection was lost.
    async fn on_disconnect(&self, reason: DisconnectReason) -> DisconnectAction;
}

#[derive(Debug)]
struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct LivenessMonitor {
    registry: Arc<LivenessRegistry>,
    filter: TopicFilter,
    heartbeat: Arc<HeartbeatWriter>,
    clock: Arc<dyn Clock>,
    watchdog: Watchdog,
    subscription: String,
    session: Mutex<Option<Session>>,
}

impl LivenessMonitor {
    pub fn new(config: &WatchdogConfig, registry: Arc<LivenessRegistry>, clock: Arc<dyn Clock>) -> Self {
        let heartbeat = Arc::new(HeartbeatWriter::new(
            config.heartbeat_path.clone(),
            config.heartbeat_mode,
        ));
        let watchdog = Watchdog::new(
            registry.clone(),
            heartbeat.clone(),
            clock.clone(),
            WatchdogSettings::from(config),
        );

        Self {
            registry,
            filter: config.topic_filter(),
            heartbeat,
            clock,
            watchdog,
            subscription: config.subscription_filter(),
            session: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<LivenessRegistry> {
        &self.registry
    }

    pub fn heartbeat(&self) -> &HeartbeatWriter {
        &self.heartbeat
    }

    /// Whether a watchdog task is currently attached to a connection.
    pub fn is_watching(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Stop the watchdog and remove the marker.
    pub async fn shutdown(&self) {
        self.end_session().await;
        self.remove_marker();
    }

    async fn end_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.handle.await {
                warn!("Watchdog task ended abnormally: {}", e);
            }
        }
    }

    fn remove_marker(&self) {
        if let Err(e) = self.heartbeat.remove() {
            warn!(
                "Failed to remove liveness marker {}: {}",
                self.heartbeat.path().display(),
                e
            );
        }
    }
}

#[async_trait]
impl ConnectionHandler for LivenessMonitor {
    async fn on_connect(&self, publisher: Arc<dyn Publisher>) -> Result<(), TransportError> {
        self.end_session().await;

        info!("Subscribing to {}", self.subscription);
        publisher.subscribe(&self.subscription).await?;

        if let Err(e) = self.heartbeat.write(self.clock.now()) {
            warn!(
                "Failed to write liveness marker {}: {}",
                self.heartbeat.path().display(),
                e
            );
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.watchdog.clone().run(publisher, cancel.clone()));
        *self.session.lock() = Some(Session { cancel, handle });

        Ok(())
    }

    fn on_message(&self, topic: &str, _payload: &[u8]) {
        if let Some(pattern) = self.filter.is_excluded(topic) {
            if pattern == topic {
                debug!("Discarding message with excluded topic {}", topic);
            } else {
                debug!("Discarding message with excluded topic {} ({})", topic, pattern);
            }
            return;
        }

        debug!("Saw {}", topic);
        self.registry.update(topic, self.clock.now());
    }

    async fn on_disconnect(&self, reason: DisconnectReason) -> DisconnectAction {
        self.end_session().await;
        self.remove_marker();
        warn!("Disconnected with result code {}", reason);

        if reason.is_clean() {
            DisconnectAction::Exit
        } else {
            DisconnectAction::Reconnect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::{ChannelTransport, Transport};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn monitor() -> (TempDir, Arc<ManualClock>, LivenessMonitor) {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("liveness");
        let config = WatchdogConfig::from_vars([
            ("MQTT_USERNAME", "watchdog"),
            ("MQTT_PASSWORD", "secret"),
            ("HEALTH_FILE_PATH", marker.to_str().unwrap()),
        ])
        .unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 10, 22, 15, 30, 45).unwrap(),
        ));
        let monitor = LivenessMonitor::new(&config, Arc::new(LivenessRegistry::new()), clock.clone());
        (dir, clock, monitor)
    }

    #[test]
    fn test_excluded_topics_are_not_recorded() {
        let (_dir, _clock, monitor) = monitor();

        monitor.on_message("zigbee2mqtt/bridge/state", b"online");
        monitor.on_message("zigbee2mqtt/bridge", b"{}");
        monitor.on_message("zigbee2mqtt/healthz", b"{}");
        assert!(monitor.registry().is_empty());

        monitor.on_message("zigbee2mqtt/kitchen_sensor", b"{}");
        assert_eq!(
            monitor.registry().most_recent().unwrap().topic,
            "zigbee2mqtt/kitchen_sensor"
        );
    }

    #[test]
    fn test_messages_are_stamped_with_clock() {
        let (_dir, clock, monitor) = monitor();
        monitor.on_message("zigbee2mqtt/kitchen_sensor", b"");
        assert_eq!(
            monitor.registry().most_recent().unwrap().timestamp,
            clock.now()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_subscribes_and_writes_marker() {
        let (_dir, _clock, monitor) = monitor();
        let (mut broker, transport) = ChannelTransport::create("test");

        monitor.on_connect(transport.publisher()).await.unwrap();

        assert_eq!(
            broker.next_subscription().await.as_deref(),
            Some("zigbee2mqtt/#")
        );
        assert!(monitor.heartbeat().path().exists());
        assert!(monitor.is_watching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_removes_marker_and_stops_watchdog() {
        let (_dir, _clock, monitor) = monitor();
        let (_broker, transport) = ChannelTransport::create("test");
        monitor.on_connect(transport.publisher()).await.unwrap();

        let action = monitor.on_disconnect(DisconnectReason::new(7)).await;

        assert_eq!(action, DisconnectAction::Reconnect);
        assert!(!monitor.heartbeat().path().exists());
        assert!(!monitor.is_watching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_disconnect_exits() {
        let (_dir, _clock, monitor) = monitor();
        assert_eq!(
            monitor.on_disconnect(DisconnectReason::CLEAN).await,
            DisconnectAction::Exit
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_watchdog() {
        let (_dir, _clock, monitor) = monitor();
        let (mut broker, transport) = ChannelTransport::create("test");
        monitor.on_message("zigbee2mqtt/kitchen_sensor", b"");

        monitor.on_connect(transport.publisher()).await.unwrap();
        monitor.on_connect(transport.publisher()).await.unwrap();
        broker.next_subscription().await.unwrap();
        broker.next_subscription().await.unwrap();

        // One loop, so one publish per interval.
        broker.next_published().await.unwrap();
        assert!(broker.try_next_published().is_none());
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        assert!(broker.try_next_published().is_some());
        assert!(broker.try_next_published().is_none());

        monitor.shutdown().await;
        assert!(!monitor.heartbeat().path().exists());
    }
}
