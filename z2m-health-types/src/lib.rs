//! # z2m-health-types
//!
//! The schema of the health report that the z2m-health watchdog publishes
//! (retained) on its health topic. Consumers such as dashboards or home
//! automation rules can depend on this crate to decode the report without
//! pulling in the watchdog itself.
//!
//! ## Features
//!
//! - `serde`: JSON (or any serde format) serialization of [`HealthReport`]
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use z2m_health_types::{HealthReport, Status};
//!
//! let last_seen = Utc.with_ymd_and_hms(2025, 10, 22, 15, 30, 45).unwrap();
//! let report = HealthReport::new(Status::Online, 12.5, &last_seen);
//!
//! assert!(report.is_online());
//! assert_eq!(report.last_seen, "2025-10-22T15:30:45.000Z");
//! ```
//!
//! With the `serde` feature the report serializes to:
//!
//! ```json
//! {"status": "online", "age_seconds": 12.5, "last_seen": "2025-10-22T15:30:45.000Z"}
//! ```

mod report;
mod status;
mod timestamp;

pub use report::*;
pub use status::*;
pub use timestamp::*;
