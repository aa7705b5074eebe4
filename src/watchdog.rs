//! The periodic watchdog task.
//!
//! One task runs per established connection. Each cycle:
//!
//! 1. refresh the liveness marker
//! 2. read the most recent sighting (empty registry: idle, nothing else)
//! 3. evaluate and publish the verdict, retained
//! 4. purge topics silent for longer than the staleness threshold
//!
//! A failed publish removes the marker until a later cycle publishes again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use z2m_health_types::{format_timestamp, HealthReport};

use crate::clock::Clock;
use crate::config::WatchdogConfig;
use crate::duration::format_duration;
use crate::health::evaluate;
use crate::heartbeat::HeartbeatWriter;
use crate::liveness::LivenessRegistry;
use crate::transport::Publisher;

/// Timing and topic settings for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub stale_after: Duration,
    pub health_topic: String,
}

impl From<&WatchdogConfig> for WatchdogSettings {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            interval: config.check_interval,
            timeout: config.timeout,
            stale_after: config.stale_after,
            health_topic: config.health_topic.clone(),
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing seen yet; heartbeat only.
    Idle,
    Published(HealthReport),
    /// The verdict could not be published; the marker was removed.
    PublishFailed,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    registry: Arc<LivenessRegistry>,
    heartbeat: Arc<HeartbeatWriter>,
    clock: Arc<dyn Clock>,
    settings: WatchdogSettings,
}

impl Watchdog {
    pub fn new(
        registry: Arc<LivenessRegistry>,
        heartbeat: Arc<HeartbeatWriter>,
        clock: Arc<dyn Clock>,
        settings: WatchdogSettings,
    ) -> Self {
        Self {
            registry,
            heartbeat,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &WatchdogSettings {
        &self.settings
    }

    /// Run one cycle against `publisher`.
    pub async fn run_cycle(&self, publisher: &dyn Publisher) -> CycleOutcome {
        let now = self.clock.now();
        self.refresh_marker(now);

        let Some(latest) = self.registry.most_recent() else {
            trace!("No device messages seen yet");
            return CycleOutcome::Idle;
        };

        let Some(report) = evaluate(now, Some(&latest), self.settings.timeout) else {
            return CycleOutcome::Idle;
        };

        info!(
            "{}: {} seen {:.0} seconds ago",
            report.status, latest.topic, report.age_seconds
        );

        let payload = match serde_json::to_vec(&report) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize health report: {}", e);
                self.withdraw_marker();
                return CycleOutcome::PublishFailed;
            }
        };
        debug!(
            "Publishing {}: {}",
            self.settings.health_topic,
            String::from_utf8_lossy(&payload)
        );

        if let Err(e) = publisher
            .publish(&self.settings.health_topic, payload, true)
            .await
        {
            warn!("Failed to publish health status: {}", e);
            self.withdraw_marker();
            return CycleOutcome::PublishFailed;
        }

        for purged in self.registry.purge_stale(now, self.settings.stale_after) {
            debug!(
                "Purging stale topic {} last seen at {}",
                purged.topic,
                format_timestamp(&purged.timestamp)
            );
        }

        CycleOutcome::Published(report)
    }

    fn refresh_marker(&self, now: DateTime<Utc>) {
        if let Err(e) = self.heartbeat.write(now) {
            warn!(
                "Failed to write liveness marker {}: {}",
                self.heartbeat.path().display(),
                e
            );
        }
    }

    fn withdraw_marker(&self) {
        if let Err(e) = self.heartbeat.remove() {
            warn!(
                "Failed to remove liveness marker {}: {}",
                self.heartbeat.path().display(),
                e
            );
        }
    }

    /// Run cycles on a fixed interval until `cancel` fires. The first cycle
    /// runs immediately.
    pub async fn run(self, publisher: Arc<dyn Publisher>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            "Watchdog started, checking every {}",
            format_duration(self.settings.interval)
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.run_cycle(publisher.as_ref()) => {}
            }
        }

        debug!("Watchdog stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::heartbeat::HeartbeatMode;
    use crate::transport::{ChannelBroker, ChannelTransport, Transport};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use tempfile::TempDir;
    use z2m_health_types::Status;

    struct Fixture {
        _dir: TempDir,
        clock: Arc<ManualClock>,
        registry: Arc<LivenessRegistry>,
        heartbeat: Arc<HeartbeatWriter>,
        watchdog: Watchdog,
        broker: ChannelBroker,
        publisher: Arc<dyn Publisher>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 22, 15, 30, 45).unwrap()
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = Arc::new(LivenessRegistry::new());
        let heartbeat = Arc::new(HeartbeatWriter::new(
            dir.path().join("liveness"),
            HeartbeatMode::Touch,
        ));
        let watchdog = Watchdog::new(
            registry.clone(),
            heartbeat.clone(),
            clock.clone(),
            WatchdogSettings {
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(60),
                stale_after: Duration::from_secs(3600),
                health_topic: "zigbee2mqtt/healthz".to_string(),
            },
        );
        let (broker, transport) = ChannelTransport::create("test");
        let publisher = transport.publisher();

        Fixture {
            _dir: dir,
            clock,
            registry,
            heartbeat,
            watchdog,
            broker,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_idle_cycle_only_refreshes_marker() {
        let mut f = fixture();

        assert_eq!(
            f.watchdog.run_cycle(f.publisher.as_ref()).await,
            CycleOutcome::Idle
        );
        assert!(f.heartbeat.path().exists());
        assert!(f.broker.try_next_published().is_none());
    }

    #[tokio::test]
    async fn test_idle_cycles_keep_marker_fresh() {
        let f = fixture();
        std::fs::write(f.heartbeat.path(), "").unwrap();
        let old = std::time::SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(f.heartbeat.path())
            .unwrap()
            .set_modified(old)
            .unwrap();

        f.watchdog.run_cycle(f.publisher.as_ref()).await;

        assert_eq!(
            crate::probe::probe(f.heartbeat.path(), Some(Duration::from_secs(60))).unwrap(),
            crate::probe::ProbeStatus::Alive
        );
    }

    #[tokio::test]
    async fn test_active_cycle_publishes_retained_report() {
        let mut f = fixture();
        f.registry.update("zigbee2mqtt/sensor/test", t0());
        f.clock.advance(TimeDelta::seconds(12));

        let outcome = f.watchdog.run_cycle(f.publisher.as_ref()).await;
        let CycleOutcome::Published(report) = outcome else {
            panic!("Expected a published report, got {:?}", outcome);
        };
        assert_eq!(report.status, Status::Online);
        assert_eq!(report.age_seconds, 12.0);

        let published = f.broker.try_next_published().unwrap();
        assert_eq!(published.topic, "zigbee2mqtt/healthz");
        assert!(published.retain);
        let body: serde_json::Value = serde_json::from_slice(&published.payload).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "status": "online",
                "age_seconds": 12.0,
                "last_seen": "2025-10-22T15:30:45.000Z",
            })
        );
        assert!(f.heartbeat.path().exists());
    }

    #[tokio::test]
    async fn test_cycle_purges_after_publishing() {
        let mut f = fixture();
        f.registry.update("old", t0());
        f.registry.update("new", t0() + TimeDelta::seconds(3600));
        f.clock.set(t0() + TimeDelta::seconds(3601));

        let outcome = f.watchdog.run_cycle(f.publisher.as_ref()).await;
        assert!(matches!(outcome, CycleOutcome::Published(_)));
        assert!(f.broker.try_next_published().is_some());

        let remaining: Vec<String> = f
            .registry
            .snapshot()
            .into_iter()
            .map(|entry| entry.topic)
            .collect();
        assert_eq!(remaining, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_everything_purged_goes_idle_for_a_cycle() {
        let f = fixture();
        f.registry.update("only", t0());
        f.clock.set(t0() + TimeDelta::hours(2));

        // Reported offline, then purged.
        let outcome = f.watchdog.run_cycle(f.publisher.as_ref()).await;
        let CycleOutcome::Published(report) = outcome else {
            panic!("Expected a published report, got {:?}", outcome);
        };
        assert_eq!(report.status, Status::Offline);
        assert!(f.registry.is_empty());

        assert_eq!(
            f.watchdog.run_cycle(f.publisher.as_ref()).await,
            CycleOutcome::Idle
        );

        f.registry.update("only", f.clock.now());
        assert!(matches!(
            f.watchdog.run_cycle(f.publisher.as_ref()).await,
            CycleOutcome::Published(_)
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_registry() {
        let f = fixture();
        f.registry.update("zigbee2mqtt/sensor/test", t0());
        f.clock.set(t0() + TimeDelta::days(2));
        f.broker.fail_publishes(true);

        assert_eq!(
            f.watchdog.run_cycle(f.publisher.as_ref()).await,
            CycleOutcome::PublishFailed
        );
        assert_eq!(f.registry.len(), 1);
        assert!(!f.heartbeat.path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval() {
        let mut f = fixture();
        f.registry.update("zigbee2mqtt/sensor/test", t0());
        let started = tokio::time::Instant::now();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(f.watchdog.clone().run(f.publisher.clone(), cancel.clone()));

        // First cycle fires immediately, the next after one interval.
        f.broker.next_published().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        f.broker.next_published().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(30));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_publish_failures() {
        let mut f = fixture();
        f.registry.update("zigbee2mqtt/sensor/test", t0());
        f.heartbeat.write(t0()).unwrap();
        f.broker.fail_publishes(true);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(f.watchdog.clone().run(f.publisher.clone(), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!f.heartbeat.path().exists());
        assert!(!task.is_finished());
        assert!(f.broker.try_next_published().is_none());

        // The next cycle after the broker accepts publishes again recovers.
        f.broker.fail_publishes(false);
        let published = f.broker.next_published().await.unwrap();
        assert_eq!(published.topic, "zigbee2mqtt/healthz");
        assert!(f.heartbeat.path().exists());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_stops_writing_heartbeat() {
        let f = fixture();
        f.registry.update("zigbee2mqtt/sensor/test", t0());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(f.watchdog.clone().run(f.publisher.clone(), cancel.clone()));
        tokio::time::sleep(Duration::from_secs(45)).await;

        cancel.cancel();
        task.await.unwrap();
        f.heartbeat.remove().unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!f.heartbeat.path().exists());
    }
}
