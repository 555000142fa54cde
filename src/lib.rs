//! # atomforge
//!
//! Dependency-ordered bundle builds for agent-authored code atoms.
//!
//! An agent assembles a program out of small, independently named, typed
//! units ("atoms") with declared dependencies; atomforge turns a game's atom
//! set into a single runnable bundle while keeping build history consistent
//! under concurrent mutation.
//!
//! ## Core Contract
//!
//! 1. Maintain the per-game dependency graph with referential integrity
//!    (no dangling dependency, no delete of a depended-upon atom)
//! 2. Produce a **deterministic topological order** or report the cycle
//! 3. Run the build state machine `building -> success | error`; a build
//!    row is never left in `building` after a fault
//! 4. Snapshot every build so any successful build is a rollback target
//!
//! ## Architecture
//!
//! ```text
//! upsert/delete ──► AtomService ──► rebuild trigger (fire-and-forget)
//!                                          │
//! BuildPipeline: snapshot → sort → render → upload → finalize → activate
//!                                          │
//! RollbackEngine: checkpoint → re-embed → restore → activate → rebuild
//!                     ▲
//!               AtomStore (Postgres or Memory)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same atoms + same edges → identical sort order (first-seen tie-break)
//! - Store reads return atoms in name order, edges in insertion order
//! - Snapshots captured against an unchanged game are identical

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atoms;
pub mod blob;
pub mod bundle;
pub mod embed;
pub mod error;
pub mod externals;
pub mod pipeline;
pub mod rollback;
pub mod snapshot;
pub mod sort;
pub mod store;
pub mod trigger;
pub mod types;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    Atom, AtomFull, AtomName, AtomSnapshot, AtomSummary, AtomType, BuildId, BuildRecord,
    BuildStatus, BuildSummary, DependencyEdge, Game, GameId, Port, SearchHit, SnapshotAtom,
    MAX_ATOM_CODE_BYTES,
};
pub use atoms::{AtomService, UpsertAtomInput, UpsertReceipt, SEARCH_SIMILARITY_THRESHOLD};
pub use blob::{BlobStore, InMemoryBlobStore};
pub use bundle::{BundleManifest, BundlePaths, BUNDLE_FILENAME};
pub use embed::{EmbeddingClient, HashEmbedder, EMBEDDING_DIM};
pub use error::{BlobError, EmbeddingError, KernelError, StoreError};
pub use externals::ExternalService;
pub use pipeline::{BuildOutcome, BuildPipeline};
pub use rollback::{RollbackEngine, RollbackOutcome};
pub use sort::{sort_atoms, CycleError};
pub use store::{AtomStore, InMemoryAtomStore};
pub use trigger::{NullRebuildTrigger, RebuildTrigger};

#[cfg(feature = "postgres")]
pub use store::PostgresAtomStore;

#[cfg(feature = "remote")]
pub use blob::HttpBlobStore;
#[cfg(feature = "remote")]
pub use embed::HttpEmbeddingClient;
#[cfg(feature = "remote")]
pub use trigger::HttpRebuildTrigger;

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};
