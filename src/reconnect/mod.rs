//! Reconnection after an abnormal disconnect.
//!
//! ```text
//!   Connected ──abnormal disconnect──▶ Retrying { attempt }
//!       ▲                                   │
//!       └──────────── success ──────────────┤
//!                                           │ deadline reached
//!                                           ▼
//!                                         Fatal
//! ```
//!
//! Attempts are strictly sequential. A fresh [`BackoffState`] is used for
//! every disconnect and dropped once the sequence ends either way.

mod backoff;

pub use backoff::{BackoffPolicy, JitterPolicy};

use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

use crate::duration::format_duration;
use crate::error::ReconnectError;
use crate::transport::Transport;

/// Progress of one reconnect sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Connection lifecycle as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Retrying { attempt: u32 },
    Fatal,
}

/// Drives reconnect attempts against a [`Transport`].
#[derive(Debug, Clone)]
pub struct ReconnectController {
    policy: BackoffPolicy,
    state: ConnectionState,
}

impl ReconnectController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Connected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Retry until the transport reconnects or the deadline is spent.
    ///
    /// An attempt is only started when its backoff delay still fits inside
    /// the deadline, and each attempt is cut off at the deadline.
    pub async fn reconnect<T>(&mut self, transport: &mut T) -> Result<BackoffState, ReconnectError>
    where
        T: Transport + ?Sized,
    {
        let started = Instant::now();
        let deadline = self.policy.deadline;
        let mut state = BackoffState::default();
        let mut last_error: Option<String> = None;

        loop {
            let delay = self.policy.delay(state.attempts);
            state.elapsed = started.elapsed();

            if state.elapsed + delay >= deadline {
                self.state = ConnectionState::Fatal;
                return Err(ReconnectError::Exhausted {
                    attempts: state.attempts,
                    elapsed: state.elapsed,
                    last_error,
                });
            }

            self.state = ConnectionState::Retrying {
                attempt: state.attempts + 1,
            };
            info!(
                "Reconnecting to {} in {} (attempt {})",
                transport.description(),
                format_duration(delay),
                state.attempts + 1
            );
            sleep(delay).await;
            state.attempts += 1;

            let remaining = deadline.saturating_sub(started.elapsed());
            match timeout(remaining, transport.reconnect()).await {
                Ok(Ok(())) => {
                    state.elapsed = started.elapsed();
                    self.state = ConnectionState::Connected;
                    info!(
                        "Reconnected to {} after {} attempts",
                        transport.description(),
                        state.attempts
                    );
                    return Ok(state);
                }
                Ok(Err(e)) => {
                    warn!("Reconnect attempt {} failed: {}", state.attempts, e);
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    warn!("Reconnect attempt {} timed out", state.attempts);
                    last_error = Some("timed out".to_string());
                }
            }
        }
    }
}
