//! # z2m-health
//!
//! A liveness watchdog for zigbee2mqtt. It watches device traffic on an
//! MQTT broker, decides whether the Zigbee network is online from how
//! recently any device spoke, publishes that verdict (retained) on a health
//! topic, and keeps a marker file that a container health check can probe.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Supervisor                             │
//! │                                                                  │
//! │  Transport ──events──▶ LivenessMonitor ──▶ TopicFilter           │
//! │      ▲                     │                    │                │
//! │      │                     │ spawn/cancel       ▼                │
//! │  ReconnectController       ▼              LivenessRegistry       │
//! │  (backoff + deadline)   Watchdog ─────────────▲                  │
//! │                            │  every CHECK_INTERVAL               │
//! │                            ├──▶ HeartbeatWriter (marker file)    │
//! │                            ├──▶ evaluate() ──▶ Publisher         │
//! │                            └──▶ purge_stale()                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`liveness`]**: topic exclusion and the concurrent last-seen registry
//! - **[`health`]**: online/offline verdict from the most recent sighting
//! - **[`heartbeat`]**: the liveness marker file
//! - **[`watchdog`]**: the periodic per-connection task
//! - **[`monitor`]**: connect/message/disconnect handling ([`ConnectionHandler`])
//! - **[`reconnect`]**: bounded exponential backoff after abnormal disconnects
//! - **[`supervisor`]**: drives a [`Transport`] and decides how the process exits
//! - **[`transport`]**: the [`Transport`]/[`Publisher`] traits with an in-memory
//!   [`ChannelTransport`] and, with the `mqtt` feature, an MQTT implementation
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! MQTT_USERNAME=watchdog MQTT_PASSWORD=secret z2m-health
//!
//! # Container health check
//! z2m-health probe --max-age 2m
//! ```
//!
//! ### As a library with an in-memory transport
//!
//! ```
//! use std::sync::Arc;
//! use z2m_health::{ChannelTransport, ShutdownSignal, Supervisor, SystemClock, WatchdogConfig};
//!
//! # tokio_test::block_on(async {
//! let marker = std::env::temp_dir().join("z2m-health-example");
//! let config = WatchdogConfig::from_vars([
//!     ("MQTT_USERNAME", "watchdog"),
//!     ("MQTT_PASSWORD", "secret"),
//!     ("HEALTH_FILE_PATH", marker.to_str().unwrap()),
//! ])
//! .unwrap();
//!
//! let (broker, transport) = ChannelTransport::create("embedded");
//! let supervisor = Supervisor::new(&config, Arc::new(SystemClock));
//!
//! // A clean disconnect ends the run.
//! broker.disconnect(0);
//! let reason = supervisor
//!     .run(transport, std::future::pending::<ShutdownSignal>())
//!     .await;
//! assert_eq!(reason.exit_code(), 1);
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod health;
pub mod heartbeat;
pub mod liveness;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod reconnect;
pub mod signals;
pub mod supervisor;
pub mod transport;
pub mod watchdog;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BrokerSettings, LogFormat, LogSettings, WatchdogConfig};
pub use error::{ConfigError, ReconnectError, TransportError};
pub use health::evaluate;
pub use heartbeat::{HeartbeatMode, HeartbeatWriter};
pub use liveness::{topic_matches, LastSeenEntry, LivenessRegistry, MatchFn, TopicFilter};
pub use monitor::{ConnectionHandler, DisconnectAction, LivenessMonitor};
pub use probe::{probe, ProbeStatus};
pub use reconnect::{
    BackoffPolicy, BackoffState, ConnectionState, JitterPolicy, ReconnectController,
};
pub use signals::{ShutdownSignal, SignalListener};
pub use supervisor::{ExitReason, Supervisor};
pub use transport::{
    ChannelBroker, ChannelTransport, DisconnectReason, PublishedMessage, Publisher, Transport,
    TransportEvent,
};
#[cfg(feature = "mqtt")]
pub use transport::{MqttTransport, MqttTransportBuilder};
pub use watchdog::{CycleOutcome, Watchdog, WatchdogSettings};
pub use z2m_health_types::{format_timestamp, HealthReport, Status};
