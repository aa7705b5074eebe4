//! Concurrent last-seen registry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::clock::to_delta;

/// A topic and the instant it was last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSeenEntry {
    pub topic: String,
    pub timestamp: DateTime<Utc>,
}

/// Thread-safe map of device topic to last-seen instant.
///
/// Written from the message delivery path, read and purged from the
/// watchdog loop. Every operation holds the internal lock for a single map
/// mutation or scan and never across I/O; the map itself is never handed out.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use z2m_health::LivenessRegistry;
///
/// let registry = LivenessRegistry::new();
/// let now = Utc::now();
/// registry.update("zigbee2mqtt/kitchen", now);
///
/// let latest = registry.most_recent().unwrap();
/// assert_eq!(latest.topic, "zigbee2mqtt/kitchen");
/// assert_eq!(latest.timestamp, now);
/// ```
#[derive(Debug, Default)]
pub struct LivenessRegistry {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl LivenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `topic` was seen at `at`.
    ///
    /// Last write wins, even when `at` is older than the stored instant.
    pub fn update(&self, topic: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.write();
        match entries.get_mut(topic) {
            Some(timestamp) => *timestamp = at,
            None => {
                entries.insert(topic.to_string(), at);
            }
        }
    }

    /// The entry with the greatest timestamp, `None` when empty.
    ///
    /// Ties are broken arbitrarily.
    pub fn most_recent(&self) -> Option<LastSeenEntry> {
        self.entries
            .read()
            .iter()
            .max_by_key(|(_, timestamp)| **timestamp)
            .map(|(topic, timestamp)| LastSeenEntry {
                topic: topic.clone(),
                timestamp: *timestamp,
            })
    }

    /// Remove every entry older than `max_age` at `now` (strictly older:
    /// an entry aged exactly `max_age` survives).
    ///
    /// Returns the removed entries.
    pub fn purge_stale(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<LastSeenEntry> {
        let max_age = to_delta(max_age);
        let mut entries = self.entries.write();

        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, timestamp)| now.signed_duration_since(**timestamp) > max_age)
            .map(|(topic, _)| topic.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|topic| {
                entries
                    .remove(&topic)
                    .map(|timestamp| LastSeenEntry { topic, timestamp })
            })
            .collect()
    }

    /// Owned copy of all entries, unordered.
    pub fn snapshot(&self) -> Vec<LastSeenEntry> {
        self.entries
            .read()
            .iter()
            .map(|(topic, timestamp)| LastSeenEntry {
                topic: topic.clone(),
                timestamp: *timestamp,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
