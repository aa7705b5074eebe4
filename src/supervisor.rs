//! Transport driver and process exit policy.
//!
//! The supervisor pulls events from a [`Transport`], dispatches them to the
//! [`LivenessMonitor`], runs the [`ReconnectController`] after abnormal
//! disconnects and decides how the process ends. Every exit path goes
//! through the same cleanup: stop the watchdog, remove the marker.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::WatchdogConfig;
use crate::liveness::LivenessRegistry;
use crate::monitor::{ConnectionHandler, DisconnectAction, LivenessMonitor};
use crate::reconnect::ReconnectController;
use crate::signals::ShutdownSignal;
use crate::transport::{Transport, TransportEvent};

/// Why the supervisor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// A termination signal was received.
    Signal(ShutdownSignal),
    /// The broker ended the connection cleanly.
    CleanDisconnect,
    /// Reconnecting failed for the whole backoff deadline.
    ReconnectExhausted,
    /// The connection came up but monitoring could not be started.
    SubscribeFailed,
}

impl ExitReason {
    /// 0 for a signal-initiated shutdown, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            ExitReason::Signal(_) => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Signal(signal) => write!(f, "received {}", signal),
            ExitReason::CleanDisconnect => write!(f, "broker closed the connection"),
            ExitReason::ReconnectExhausted => write!(f, "could not reconnect to the broker"),
            ExitReason::SubscribeFailed => write!(f, "could not subscribe to device topics"),
        }
    }
}

#[derive(Debug)]
pub struct Supervisor {
    monitor: LivenessMonitor,
    reconnect: ReconnectController,
}

impl Supervisor {
    pub fn new(config: &WatchdogConfig, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(LivenessRegistry::new());
        Self {
            monitor: LivenessMonitor::new(config, registry, clock),
            reconnect: ReconnectController::new(config.backoff),
        }
    }

    /// The shared registry, for inspection.
    pub fn registry(&self) -> Arc<LivenessRegistry> {
        self.monitor.registry().clone()
    }

    /// Drive `transport` until a terminal condition or `shutdown` resolves.
    pub async fn run<T, S>(mut self, mut transport: T, shutdown: S) -> ExitReason
    where
        T: Transport,
        S: Future<Output = ShutdownSignal>,
    {
        tokio::pin!(shutdown);
        info!("Watchdog supervising {}", transport.description());

        let reason = loop {
            let event = tokio::select! {
                biased;
                signal = &mut shutdown => break ExitReason::Signal(signal),
                event = transport.next_event() => event,
            };

            match event {
                TransportEvent::Connected => {
                    debug!("Connected to {}", transport.description());
                    if let Err(e) = self.monitor.on_connect(transport.publisher()).await {
                        error!("Failed to start monitoring: {}", e);
                        break ExitReason::SubscribeFailed;
                    }
                }
                TransportEvent::Message { topic, payload } => {
                    self.monitor.on_message(&topic, &payload);
                }
                TransportEvent::Disconnected(cause) => {
                    if self.monitor.on_disconnect(cause).await == DisconnectAction::Exit {
                        break ExitReason::CleanDisconnect;
                    }

                    let result = tokio::select! {
                        biased;
                        signal = &mut shutdown => break ExitReason::Signal(signal),
                        result = self.reconnect.reconnect(&mut transport) => result,
                    };

                    match result {
                        Ok(_) => {
                            if let Err(e) = self.monitor.on_connect(transport.publisher()).await {
                                error!("Failed to start monitoring: {}", e);
                                break ExitReason::SubscribeFailed;
                            }
                        }
                        Err(e) => {
                            error!("{}", e);
                            break ExitReason::ReconnectExhausted;
                        }
                    }
                }
            }
        };

        self.monitor.shutdown().await;

        match &reason {
            ExitReason::Signal(_) => info!("Shutting down: {}", reason),
            _ => warn!("Exiting: {}", reason),
        }

        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitReason::Signal(ShutdownSignal::Terminate).exit_code(), 0);
        assert_eq!(ExitReason::Signal(ShutdownSignal::Interrupt).exit_code(), 0);
        assert_eq!(ExitReason::CleanDisconnect.exit_code(), 1);
        assert_eq!(ExitReason::ReconnectExhausted.exit_code(), 1);
        assert_eq!(ExitReason::SubscribeFailed.exit_code(), 1);
    }

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(
            ExitReason::Signal(ShutdownSignal::Terminate).to_string(),
            "received SIGTERM"
        );
    }
}
