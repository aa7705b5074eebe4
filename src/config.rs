//! Watchdog configuration.
//!
//! Settings come from an optional TOML file overlaid with environment
//! variables. Keys are the lowercased variable names, so `CHECK_INTERVAL=45`
//! in the environment and `check_interval = "45"` in the file are the same
//! setting.
//!
//! # Example config file
//!
//! ```toml
//! mqtt_broker = "mosquitto.local"
//! mqtt_username = "watchdog"
//! check_interval = "30s"
//! timeout_seconds = "2m"
//! excluded_topics = "zigbee2mqtt/bridge/#,zigbee2mqtt/default/#"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::heartbeat::HeartbeatMode;
use crate::liveness::TopicFilter;
use crate::reconnect::{BackoffPolicy, JitterPolicy};

/// Settings as read from the sources, before validation.
///
/// Everything is a string so numbers may come from either the environment
/// or the file without type mismatches.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSettings {
    log_level: String,
    log_format: String,
    mqtt_broker: String,
    mqtt_port: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_client_id: Option<String>,
    mqtt_keepalive: String,
    check_interval: String,
    timeout_seconds: String,
    stale_topic_age_seconds: String,
    health_topic: String,
    device_topic_prefix: String,
    excluded_topics: String,
    health_file_path: String,
    heartbeat_mode: String,
    reconnect_base_delay: String,
    reconnect_max_delay: String,
    reconnect_deadline: String,
    reconnect_jitter: String,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            mqtt_broker: "localhost".to_string(),
            mqtt_port: "1883".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_client_id: None,
            mqtt_keepalive: "60s".to_string(),
            check_interval: "30".to_string(),
            timeout_seconds: "60".to_string(),
            stale_topic_age_seconds: "86400".to_string(),
            health_topic: "zigbee2mqtt/healthz".to_string(),
            device_topic_prefix: "zigbee2mqtt/".to_string(),
            excluded_topics: "zigbee2mqtt/bridge/#,zigbee2mqtt/default/#".to_string(),
            health_file_path: "/tmp/liveness".to_string(),
            heartbeat_mode: "touch".to_string(),
            reconnect_base_delay: "1s".to_string(),
            reconnect_max_delay: "60s".to_string(),
            reconnect_deadline: "5m".to_string(),
            reconnect_jitter: "full".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "unknown log format '{}' (expected pretty, compact or json)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

/// Broker connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub log: LogSettings,
    pub broker: BrokerSettings,
    pub check_interval: Duration,
    /// Online threshold: a fleet last heard from within this window is online.
    pub timeout: Duration,
    /// Topics silent for longer than this are purged.
    pub stale_after: Duration,
    pub health_topic: String,
    pub device_topic_prefix: String,
    pub excluded_topics: Vec<String>,
    pub heartbeat_path: PathBuf,
    pub heartbeat_mode: HeartbeatMode,
    pub backoff: BackoffPolicy,
}

impl WatchdogConfig {
    /// Load from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder.add_source(Environment::default()).build()?;

        Self::from_raw(config.try_deserialize()?)
    }

    /// Load from an explicit set of variables instead of the process
    /// environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let config = Config::builder()
            .add_source(Environment::default().source(Some(vars)))
            .build()?;

        Self::from_raw(config.try_deserialize()?)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let username = required("MQTT_USERNAME", raw.mqtt_username)?;
        let password = required("MQTT_PASSWORD", raw.mqtt_password)?;

        let port = raw
            .mqtt_port
            .trim()
            .parse::<u16>()
            .map_err(|e| invalid("MQTT_PORT", e))?;

        let client_id = raw
            .mqtt_client_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(default_client_id);

        let check_interval = duration("CHECK_INTERVAL", &raw.check_interval)?;
        if check_interval.is_zero() {
            return Err(invalid("CHECK_INTERVAL", "must be greater than zero"));
        }

        let health_topic = raw.health_topic.trim().to_string();
        if health_topic.is_empty() {
            return Err(ConfigError::Missing("HEALTH_TOPIC"));
        }

        let excluded_topics = raw
            .excluded_topics
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(String::from)
            .collect();

        let backoff = BackoffPolicy {
            first: duration("RECONNECT_BASE_DELAY", &raw.reconnect_base_delay)?,
            max: duration("RECONNECT_MAX_DELAY", &raw.reconnect_max_delay)?,
            deadline: duration("RECONNECT_DEADLINE", &raw.reconnect_deadline)?,
            jitter: raw
                .reconnect_jitter
                .parse::<JitterPolicy>()
                .map_err(|e| invalid("RECONNECT_JITTER", e))?,
            ..BackoffPolicy::default()
        };

        Ok(Self {
            log: LogSettings {
                level: raw.log_level.trim().to_string(),
                format: raw
                    .log_format
                    .parse()
                    .map_err(|e| invalid("LOG_FORMAT", e))?,
            },
            broker: BrokerSettings {
                host: raw.mqtt_broker.trim().to_string(),
                port,
                username,
                password,
                client_id,
                keep_alive: duration("MQTT_KEEPALIVE", &raw.mqtt_keepalive)?,
            },
            check_interval,
            timeout: duration("TIMEOUT_SECONDS", &raw.timeout_seconds)?,
            stale_after: duration("STALE_TOPIC_AGE_SECONDS", &raw.stale_topic_age_seconds)?,
            health_topic,
            device_topic_prefix: raw.device_topic_prefix.trim().to_string(),
            excluded_topics,
            heartbeat_path: PathBuf::from(raw.health_file_path.trim()),
            heartbeat_mode: raw
                .heartbeat_mode
                .parse()
                .map_err(|e| invalid("HEARTBEAT_MODE", e))?,
            backoff,
        })
    }

    /// The wildcard subscription covering all device topics.
    pub fn subscription_filter(&self) -> String {
        format!("{}#", self.device_topic_prefix)
    }

    /// Exclusion filter, including the health topic.
    pub fn topic_filter(&self) -> TopicFilter {
        TopicFilter::new(self.excluded_topics.iter().cloned(), &self.health_topic)
    }
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|e| invalid(key, e))
}

fn invalid(key: &'static str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

fn default_client_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "z2m-health".to_string())
}
