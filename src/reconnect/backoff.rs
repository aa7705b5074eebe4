//! Backoff and jitter for reconnection attempts.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`, then
//! jittered. The base is derived from the attempt number alone, so jitter
//! never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use z2m_health::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     jitter: JitterPolicy::None,
//!     ..BackoffPolicy::default()
//! };
//!
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(3), Duration::from_secs(8));
//! assert_eq!(backoff.delay(10), Duration::from_secs(60));
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

/// Randomization applied to each backoff delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JitterPolicy {
    /// Exact delays.
    None,
    /// Random delay in `[0, delay]`.
    #[default]
    Full,
}

impl JitterPolicy {
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => {
                let ms = delay.as_millis() as u64;
                if ms == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::rng().random_range(0..=ms))
            }
        }
    }
}

impl FromStr for JitterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(JitterPolicy::None),
            "full" => Ok(JitterPolicy::Full),
            other => Err(format!(
                "unknown jitter policy '{}' (expected none or full)",
                other
            )),
        }
    }
}

impl fmt::Display for JitterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitterPolicy::None => write!(f, "none"),
            JitterPolicy::Full => write!(f, "full"),
        }
    }
}

/// Reconnection backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first attempt.
    pub first: Duration,
    /// Cap on any single delay.
    pub max: Duration,
    /// Growth factor per attempt.
    pub factor: f64,
    pub jitter: JitterPolicy,
    /// Total time budget for one reconnect sequence.
    pub deadline: Duration,
}

impl Default for BackoffPolicy {
    /// 1s doubling up to 60s, full jitter, five minute deadline.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: JitterPolicy::Full,
            deadline: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        self.jitter.apply(base)
    }
}
