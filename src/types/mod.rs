//! Domain types for the build core.

pub mod atom;
pub mod build;
pub mod edge;
pub mod external;
pub mod game;
pub mod snapshot;

pub use atom::{
    format_signature, Atom, AtomFull, AtomName, AtomSummary, AtomType, InvalidAtomName, Port,
    SearchHit, MAX_ATOM_CODE_BYTES,
};
pub use build::{BuildId, BuildRecord, BuildStatus, BuildSummary, NewBuild};
pub use edge::DependencyEdge;
pub use external::{ExternalDetail, InstalledExternal, RegistryEntry};
pub use game::{Game, GameId};
pub use snapshot::{AtomSnapshot, SnapshotAtom};
