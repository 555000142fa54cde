//! Dependency edges between atoms.

use serde::{Deserialize, Serialize};
use super::atom::AtomName;

/// Directed "depends on" relation between two atoms in the same game.
///
/// `dependent` must be loaded *after* `depends_on`. Edges are wholly owned by
/// the dependent atom: an upsert replaces all of that atom's outgoing edges.
/// Implements `Ord` for canonical ordering: (dependent, depends_on).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The atom that declares the dependency.
    #[serde(rename = "atom_name")]
    pub dependent: AtomName,
    /// The atom it depends on.
    pub depends_on: AtomName,
}

impl DependencyEdge {
    /// Create a new edge.
    pub fn new(dependent: AtomName, depends_on: AtomName) -> Self {
        Self {
            dependent,
            depends_on,
        }
    }

    /// Whether the edge points from an atom to itself.
    ///
    /// Self-edges are accepted by the write path but carry no ordering
    /// constraint; the sorter skips them.
    pub fn is_self_edge(&self) -> bool {
        self.dependent == self.depends_on
    }
}

// Canonical ordering: dependent, then depends_on
impl PartialOrd for DependencyEdge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DependencyEdge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.dependent.cmp(&other.dependent) {
            std::cmp::Ordering::Equal => self.depends_on.cmp(&other.depends_on),
            ord => ord,
        }
    }
}
