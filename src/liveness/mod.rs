//! Last-seen bookkeeping for device topics.
//!
//! - [`filter`]: decides which topics count as device traffic
//! - [`registry`]: concurrent topic -> last-seen map with staleness purge
//!
//! ```text
//! inbound (topic, payload)
//!        │
//!        ▼
//! TopicFilter::is_excluded() ──▶ Some(pattern): dropped
//!        │ None
//!        ▼
//! LivenessRegistry::update(topic, now)
//! ```

pub mod filter;
pub mod registry;

pub use filter::{topic_matches, MatchFn, TopicFilter};
pub use registry::{LastSeenEntry, LivenessRegistry};
