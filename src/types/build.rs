//! Build types: one record per pipeline run, immutable once finalized.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::game::GameId;
use super::snapshot::AtomSnapshot;

/// Unique identifier for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(Uuid);

impl BuildId {
    /// Create a new BuildId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a new BuildId from a UUID string.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BuildId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Build state machine: `building -> success` or `building -> error`.
/// Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Pipeline in flight.
    Building,
    /// Finalized successfully.
    Success,
    /// Finalized with an error.
    Error,
}

impl BuildStatus {
    /// Parse status from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "building" => Some(Self::Building),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Building)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Full build record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Unique identifier.
    pub id: BuildId,
    /// Owning game.
    pub game_id: GameId,
    /// Current status.
    pub status: BuildStatus,
    /// Public URL of the latest-bundle artifact, if one was produced.
    pub bundle_url: Option<String>,
    /// Number of atoms bundled.
    pub atom_count: Option<u32>,
    /// Failure message when status is `error`.
    pub error_message: Option<String>,
    /// Sorted atom name sequence, or descriptive notes.
    pub build_log: Vec<String>,
    /// Point-in-time copy of the game's atoms and edges; the rollback unit.
    pub atom_snapshot: Option<AtomSnapshot>,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Listing view of a build, without snapshot or log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Unique identifier.
    pub id: BuildId,
    /// Current status.
    pub status: BuildStatus,
    /// Public URL of the latest-bundle artifact, if one was produced.
    pub bundle_url: Option<String>,
    /// Number of atoms bundled.
    pub atom_count: Option<u32>,
    /// Failure message when status is `error`.
    pub error_message: Option<String>,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A fully formed build row inserted in one shot (rollback checkpoints).
#[derive(Debug, Clone)]
pub struct NewBuild {
    /// Terminal status to record.
    pub status: BuildStatus,
    /// Number of atoms captured.
    pub atom_count: u32,
    /// Descriptive log entries.
    pub build_log: Vec<String>,
    /// Snapshot to attach.
    pub atom_snapshot: Option<AtomSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [BuildStatus::Building, BuildStatus::Success, BuildStatus::Error] {
            assert_eq!(BuildStatus::from_str(&status.to_string()), Some(status));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BuildStatus::Building.is_terminal());
        assert!(BuildStatus::Success.is_terminal());
        assert!(BuildStatus::Error.is_terminal());
    }
}
