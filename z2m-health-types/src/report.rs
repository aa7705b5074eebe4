//! HealthReport - the retained payload on the health topic.

use chrono::{DateTime, Utc};

use crate::{format_timestamp, Status};

/// A health verdict derived from the most recently seen device message.
///
/// Reports are computed fresh on every watchdog cycle and are never partially
/// built: either the watchdog has seen at least one device message and a full
/// report exists, or the cycle publishes nothing.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use z2m_health_types::{HealthReport, Status};
///
/// let last_seen = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
/// let report = HealthReport::new(Status::Offline, 90.0, &last_seen);
///
/// assert!(!report.is_online());
/// // Serialize with serde (requires "serde" feature)
/// // let json = serde_json::to_string(&report)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthReport {
    /// Online/offline verdict.
    pub status: Status,

    /// Seconds elapsed between the most recent device message and the
    /// evaluation instant.
    pub age_seconds: f64,

    /// When the most recent device message was seen, ISO-8601 with a `Z` suffix.
    pub last_seen: String,
}

impl HealthReport {
    /// Create a report, rendering `last_seen` with [`format_timestamp`].
    pub fn new(status: Status, age_seconds: f64, last_seen: &DateTime<Utc>) -> Self {
        Self {
            status,
            age_seconds,
            last_seen: format_timestamp(last_seen),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }
}
