//! Atom snapshots: the immutable, self-contained unit of rollback.

use serde::{Deserialize, Serialize};

use super::atom::{Atom, AtomName, AtomType, Port};
use super::edge::DependencyEdge;

/// An atom as captured in a snapshot: the full shape minus embedding and
/// version. Embeddings are regenerated on restore; versions restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAtom {
    /// Atom name.
    pub name: AtomName,
    /// Atom kind.
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    /// Code body.
    pub code: String,
    /// Optional description.
    pub description: Option<String>,
    /// Input ports.
    pub inputs: Vec<Port>,
    /// Output ports.
    pub outputs: Vec<Port>,
}

impl From<Atom> for SnapshotAtom {
    fn from(atom: Atom) -> Self {
        Self {
            name: atom.name,
            atom_type: atom.atom_type,
            code: atom.code,
            description: atom.description,
            inputs: atom.inputs,
            outputs: atom.outputs,
        }
    }
}

/// Point-in-time copy of a game's full atom and edge set.
///
/// Self-contained: restoring one requires no reference to any other record.
/// Each build owns its snapshot by value; snapshots in different builds never
/// alias the same storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomSnapshot {
    /// All atoms at capture time.
    pub atoms: Vec<SnapshotAtom>,
    /// All dependency edges at capture time.
    pub dependencies: Vec<DependencyEdge>,
}

impl AtomSnapshot {
    /// Number of atoms in the snapshot.
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Whether the snapshot holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}
