//! Online/offline verdicts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use z2m_health_types::{HealthReport, Status};

use crate::clock::to_delta;
use crate::liveness::LastSeenEntry;

/// Turn the most recent sighting into a verdict.
///
/// Returns `None` when no device has been seen yet. Otherwise the status is
/// online while the age is within `timeout` (inclusive) and offline past it.
/// A sighting in the future (clock skew) yields a negative age and counts
/// as online.
pub fn evaluate(
    now: DateTime<Utc>,
    latest: Option<&LastSeenEntry>,
    timeout: Duration,
) -> Option<HealthReport> {
    let latest = latest?;
    let age = now.signed_duration_since(latest.timestamp);

    let status = if age <= to_delta(timeout) {
        Status::Online
    } else {
        Status::Offline
    };

    Some(HealthReport::new(
        status,
        age_seconds(age),
        &latest.timestamp,
    ))
}

fn age_seconds(age: chrono::TimeDelta) -> f64 {
    match age.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        // Beyond ~292k years of skew; second precision is plenty.
        None => age.num_seconds() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn seen_at(at: DateTime<Utc>) -> LastSeenEntry {
        LastSeenEntry {
            topic: "zigbee2mqtt/sensor".to_string(),
            timestamp: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 22, 15, 30, 45).unwrap()
    }

    #[test]
    fn no_sighting_no_verdict() {
        assert_eq!(evaluate(t0(), None, Duration::from_secs(60)), None);
    }

    #[test]
    fn recent_sighting_is_online() {
        let entry = seen_at(t0());
        let report = evaluate(
            t0() + TimeDelta::seconds(30),
            Some(&entry),
            Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(report.status, Status::Online);
        assert_eq!(report.age_seconds, 30.0);
        assert_eq!(report.last_seen, "2025-10-22T15:30:45.000Z");
    }

    #[test]
    fn age_equal_to_timeout_is_online() {
        let entry = seen_at(t0());
        let report = evaluate(
            t0() + TimeDelta::seconds(60),
            Some(&entry),
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(report.status, Status::Online);
    }

    #[test]
    fn just_past_timeout_is_offline() {
        let entry = seen_at(t0());
        let report = evaluate(
            t0() + TimeDelta::milliseconds(60_001),
            Some(&entry),
            Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(report.status, Status::Offline);
        assert!((report.age_seconds - 60.001).abs() < 1e-9);
    }

    #[test]
    fn future_sighting_reports_negative_age() {
        let entry = seen_at(t0() + TimeDelta::seconds(5));
        let report = evaluate(t0(), Some(&entry), Duration::from_secs(60)).unwrap();

        assert_eq!(report.status, Status::Online);
        assert_eq!(report.age_seconds, -5.0);
    }

    #[test]
    fn zero_timeout_only_accepts_same_instant() {
        let entry = seen_at(t0());
        assert_eq!(
            evaluate(t0(), Some(&entry), Duration::ZERO).unwrap().status,
            Status::Online
        );
        assert_eq!(
            evaluate(t0() + TimeDelta::microseconds(1), Some(&entry), Duration::ZERO)
                .unwrap()
                .status,
            Status::Offline
        );
    }
}
