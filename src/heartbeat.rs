//! Liveness marker file.
//!
//! An external probe treats the marker's presence (and optionally its
//! freshness) as "the watchdog is alive". The marker is written on every
//! successful connect and every watchdog cycle, and removed on disconnect
//! or shutdown.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// What the marker file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartbeatMode {
    /// Empty file; only existence and mtime carry meaning.
    #[default]
    Touch,
    /// The current Unix time in whole seconds.
    Timestamp,
}

impl FromStr for HeartbeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "touch" => Ok(Self::Touch),
            "timestamp" => Ok(Self::Timestamp),
            other => Err(format!(
                "unknown heartbeat mode '{}' (expected touch or timestamp)",
                other
            )),
        }
    }
}

impl fmt::Display for HeartbeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Touch => write!(f, "touch"),
            Self::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Writes and removes the marker file.
#[derive(Debug, Clone)]
pub struct HeartbeatWriter {
    path: PathBuf,
    mode: HeartbeatMode,
}

impl HeartbeatWriter {
    pub fn new(path: impl Into<PathBuf>, mode: HeartbeatMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Create or refresh the marker.
    ///
    /// Synchronous on purpose: a watchdog cycle cancelled mid-way must not
    /// leave a write in flight that could land after [`remove`](Self::remove).
    pub fn write(&self, now: DateTime<Utc>) -> io::Result<()> {
        match self.mode {
            HeartbeatMode::Touch => {
                let file = File::create(&self.path)?;
                file.set_modified(SystemTime::now())
            }
            HeartbeatMode::Timestamp => fs::write(&self.path, now.timestamp().to_string()),
        }
    }

    /// Remove the marker. A missing marker is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> HeartbeatMode {
        self.mode
    }
}
