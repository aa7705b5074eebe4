//! Online/offline verdict.

use core::fmt;

/// Liveness verdict for the device fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Status {
    /// A device message was seen within the online threshold.
    Online,
    /// The most recent device message is older than the online threshold.
    Offline,
}

impl Status {
    /// Wire representation, as published in the report.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Online => "online",
            Status::Offline => "offline",
        }
    }

    pub const fn is_online(&self) -> bool {
        matches!(self, Status::Online)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(Status::Online.to_string(), "online");
        assert_eq!(Status::Offline.to_string(), "offline");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Online).unwrap(), "\"online\"");
        assert_eq!(
            serde_json::from_str::<Status>("\"offline\"").unwrap(),
            Status::Offline
        );
    }
}
