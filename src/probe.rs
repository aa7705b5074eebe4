//! Liveness probe for container health checks.
//!
//! `z2m-health probe` exits 0 when the marker exists and 1 otherwise. With
//! `--max-age` the marker must also have been modified recently.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Outcome of checking the marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Alive,
    Missing,
    Stale { age: Duration },
}

impl ProbeStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeStatus::Alive)
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_alive() {
            0
        } else {
            1
        }
    }
}

/// Check the marker at `path`.
///
/// A marker whose mtime lies in the future is treated as fresh.
pub fn probe(path: &Path, max_age: Option<Duration>) -> io::Result<ProbeStatus> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ProbeStatus::Missing),
        Err(e) => return Err(e),
    };

    let Some(max_age) = max_age else {
        return Ok(ProbeStatus::Alive);
    };

    let age = SystemTime::now()
        .duration_since(metadata.modified()?)
        .unwrap_or(Duration::ZERO);

    if age > max_age {
        Ok(ProbeStatus::Stale { age })
    } else {
        Ok(ProbeStatus::Alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_marker() {
        let dir = tempdir().unwrap();
        let status = probe(&dir.path().join("liveness"), None).unwrap();
        assert_eq!(status, ProbeStatus::Missing);
        assert_eq!(status.exit_code(), 1);
    }

    #[test]
    fn present_marker_is_alive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("liveness");
        fs::write(&path, "").unwrap();

        let status = probe(&path, None).unwrap();
        assert_eq!(status, ProbeStatus::Alive);
        assert_eq!(status.exit_code(), 0);
    }

    #[test]
    fn fresh_marker_within_max_age() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("liveness");
        fs::write(&path, "").unwrap();

        assert!(probe(&path, Some(Duration::from_secs(3600)))
            .unwrap()
            .is_alive());
    }

    #[test]
    fn old_marker_is_stale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("liveness");
        let file = fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(600))
            .unwrap();
        drop(file);

        match probe(&path, Some(Duration::from_secs(120))).unwrap() {
            ProbeStatus::Stale { age } => assert!(age >= Duration::from_secs(599)),
            other => panic!("Expected stale marker, got {:?}", other),
        }
    }
}
