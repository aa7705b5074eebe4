//! Error types for configuration, transport and reconnection.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A required setting is absent or empty.
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    /// A setting is present but unusable.
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Errors reported by a transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting (or reconnecting) to the broker failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The broker rejected or never acknowledged a subscription.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// A publish could not be handed to the broker.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The transport was shut down.
    #[error("Transport closed")]
    Closed,
}

/// Errors from the reconnection controller.
#[derive(Debug, Error)]
pub enum ReconnectError {
    /// Every attempt within the deadline failed.
    #[error("Gave up reconnecting after {attempts} attempts in {elapsed:?}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    },
}
