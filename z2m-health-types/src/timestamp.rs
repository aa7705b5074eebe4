//! Timestamp rendering for the `last_seen` field.

use chrono::{DateTime, Utc};

/// Render a UTC instant as ISO-8601 with millisecond precision and a literal
/// `Z` suffix, e.g. `2025-10-22T15:30:45.123Z`.
///
/// Sub-millisecond digits are truncated, never rounded: `.999999` renders as
/// `.999`.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn at_micros(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, micros: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_micro_opt(h, mi, s, micros)
            .unwrap();
        Utc.from_utc_datetime(&naive)
    }

    #[test]
    fn renders_milliseconds() {
        let at = at_micros(2025, 10, 22, 15, 30, 45, 123_456);
        assert_eq!(format_timestamp(&at), "2025-10-22T15:30:45.123Z");
    }

    #[test]
    fn truncates_instead_of_rounding() {
        let at = at_micros(2020, 1, 1, 0, 0, 0, 999_999);
        assert_eq!(format_timestamp(&at), "2020-01-01T00:00:00.999Z");
    }

    #[test]
    fn pads_whole_seconds() {
        let at = at_micros(2024, 2, 29, 23, 59, 59, 0);
        assert_eq!(format_timestamp(&at), "2024-02-29T23:59:59.000Z");
    }

    #[test]
    fn keeps_leading_zero_milliseconds() {
        let at = at_micros(2025, 1, 2, 3, 4, 5, 7_999);
        assert_eq!(format_timestamp(&at), "2025-01-02T03:04:05.007Z");
    }
}
