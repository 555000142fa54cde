//! Game types: the isolation boundary for atoms, edges, and builds.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::build::BuildId;

/// Unique identifier for a game.
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(Uuid);

impl GameId {
    /// Create a new GameId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a new GameId from a UUID string.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GameId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A game: the scope that owns a set of atoms, edges, and builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    /// Unique identifier.
    pub id: GameId,
    /// Unique name; used in artifact paths.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Most recently successful build, if any. Last-writer-wins under
    /// concurrent builds.
    pub active_build_id: Option<BuildId>,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last update time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
