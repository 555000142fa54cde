//! Storage backends for games, atoms, edges, builds, and externals.
//!
//! The store is an injected dependency: every engine takes an
//! [`AtomStore`] handle at construction, so tests substitute the in-memory
//! backend for PostgreSQL. Implementations must guarantee deterministic
//! ordering of results and scope every operation by game.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    Atom, AtomName, AtomSnapshot, AtomType, BuildId, BuildRecord, BuildSummary, DependencyEdge,
    ExternalDetail, Game, GameId, InstalledExternal, NewBuild, Port, RegistryEntry, SnapshotAtom,
};

/// Write shape for an atom upsert. The store assigns the version: 1 on
/// insert, previous + 1 on replace.
#[derive(Debug, Clone)]
pub struct AtomUpsert {
    /// Atom name (identity key within the game).
    pub name: AtomName,
    /// Atom kind.
    pub atom_type: AtomType,
    /// Code body.
    pub code: String,
    /// Optional description.
    pub description: Option<String>,
    /// Input ports.
    pub inputs: Vec<Port>,
    /// Output ports.
    pub outputs: Vec<Port>,
    /// Embedding vector derived from name, signature, description, and code.
    pub embedding: Vec<f32>,
}

/// An atom being restored from a snapshot, paired with its regenerated
/// embedding.
#[derive(Debug, Clone)]
pub struct RestoredAtom {
    /// Snapshot shape of the atom.
    pub atom: SnapshotAtom,
    /// Freshly generated embedding.
    pub embedding: Vec<f32>,
}

/// A full row of the external-library registry, including fields that only
/// some read paths expose.
#[derive(Debug, Clone)]
pub struct RegistryRow {
    /// Listing fields.
    pub entry: RegistryEntry,
    /// API surface documentation.
    pub api_surface: String,
    /// Load mechanism: `"script"` or `"module"`.
    pub load_type: String,
    /// Import map for module-loaded libraries.
    pub module_imports: Option<BTreeMap<String, String>>,
}

/// Trait for storage backends.
///
/// All methods are async to support database access. Multi-row sequences
/// (`replace_edges`, `restore_atoms`) must be applied atomically where the
/// backend offers a transaction primitive.
#[async_trait]
pub trait AtomStore: Send + Sync {
    // ── Games ────────────────────────────────────────────────────────────

    /// Create a game. Fails on duplicate name.
    async fn create_game(&self, name: &str, description: Option<&str>)
        -> Result<Game, StoreError>;

    /// Fetch a game by id.
    async fn get_game(&self, id: GameId) -> Result<Option<Game>, StoreError>;

    /// Fetch a game by name.
    async fn get_game_by_name(&self, name: &str) -> Result<Option<Game>, StoreError>;

    /// List all games, oldest first.
    async fn list_games(&self) -> Result<Vec<Game>, StoreError>;

    /// Point the game's active build at `build`.
    ///
    /// Last-writer-wins: concurrent successful builds race to set this and
    /// the final value is whichever update lands last. Accepted behavior:
    /// every build's artifact stays addressable by its versioned path.
    async fn set_active_build(&self, game: GameId, build: BuildId) -> Result<(), StoreError>;

    // ── Atoms ────────────────────────────────────────────────────────────

    /// List atoms for a game, ordered by name, optionally filtered by type.
    async fn list_atoms(
        &self,
        game: GameId,
        type_filter: Option<AtomType>,
    ) -> Result<Vec<Atom>, StoreError>;

    /// Fetch the subset of `names` that exists, ordered by name.
    async fn get_atoms(&self, game: GameId, names: &[AtomName]) -> Result<Vec<Atom>, StoreError>;

    /// Insert-or-replace an atom keyed by (game, name), bumping the version.
    async fn upsert_atom(&self, game: GameId, row: AtomUpsert) -> Result<Atom, StoreError>;

    /// Delete an atom and its outgoing edges. Returns false when the atom
    /// does not exist. Callers enforce the dependents guard first.
    async fn delete_atom(&self, game: GameId, name: &AtomName) -> Result<bool, StoreError>;

    // ── Edges ────────────────────────────────────────────────────────────

    /// All dependency edges for a game, in insertion order.
    async fn list_edges(&self, game: GameId) -> Result<Vec<DependencyEdge>, StoreError>;

    /// Edges whose dependent is among `names`.
    async fn edges_for(
        &self,
        game: GameId,
        names: &[AtomName],
    ) -> Result<Vec<DependencyEdge>, StoreError>;

    /// Names of atoms that depend on `name`, ordered.
    async fn dependents_of(
        &self,
        game: GameId,
        name: &AtomName,
    ) -> Result<Vec<AtomName>, StoreError>;

    /// Replace all outgoing edges of `dependent` with `depends_on`, as one
    /// operation, with no observable intermediate state with zero edges.
    async fn replace_edges(
        &self,
        game: GameId,
        dependent: &AtomName,
        depends_on: &[AtomName],
    ) -> Result<(), StoreError>;

    // ── Builds ───────────────────────────────────────────────────────────

    /// Create a build row in `building` state.
    async fn create_build(&self, game: GameId) -> Result<BuildId, StoreError>;

    /// Attach a snapshot to an in-flight build row.
    async fn attach_snapshot(
        &self,
        game: GameId,
        build: BuildId,
        snapshot: &AtomSnapshot,
    ) -> Result<(), StoreError>;

    /// Finalize a build as `success`.
    async fn finalize_build_success(
        &self,
        game: GameId,
        build: BuildId,
        atom_count: u32,
        build_log: &[String],
        bundle_url: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Finalize a build as `error` with a message.
    async fn finalize_build_error(
        &self,
        game: GameId,
        build: BuildId,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Insert a fully formed build row (rollback checkpoints).
    async fn insert_build(&self, game: GameId, build: NewBuild) -> Result<BuildId, StoreError>;

    /// Fetch a build by id, scoped to the game.
    async fn get_build(
        &self,
        game: GameId,
        build: BuildId,
    ) -> Result<Option<BuildRecord>, StoreError>;

    /// List builds for a game, newest first.
    async fn list_builds(&self, game: GameId, limit: usize)
        -> Result<Vec<BuildSummary>, StoreError>;

    // ── Restore ──────────────────────────────────────────────────────────

    /// Replace the game's entire atom and edge set with the given restored
    /// set. Applied in the strongest transaction the backend offers: either
    /// the whole restore lands or none of it does.
    async fn restore_atoms(
        &self,
        game: GameId,
        atoms: &[RestoredAtom],
        edges: &[DependencyEdge],
    ) -> Result<(), StoreError>;

    // ── Vector search ────────────────────────────────────────────────────

    /// Nearest-neighbor search over atom embeddings, filtered to the game
    /// and to cosine similarity ≥ `threshold`, ranked best-first.
    async fn search_by_embedding(
        &self,
        game: GameId,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(Atom, f32)>, StoreError>;

    // ── Externals ────────────────────────────────────────────────────────

    /// List the curated registry, ordered by name.
    async fn list_registry(&self) -> Result<Vec<RegistryEntry>, StoreError>;

    /// Fetch a registry entry by name.
    async fn get_registry_entry(&self, name: &str) -> Result<Option<RegistryEntry>, StoreError>;

    /// Install a registry entry into a game. Returns false when already
    /// installed.
    async fn install_external(&self, game: GameId, registry_id: Uuid)
        -> Result<bool, StoreError>;

    /// Remove a registry entry from a game. Returns false when not
    /// installed.
    async fn uninstall_external(
        &self,
        game: GameId,
        registry_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Installed externals for a game, oldest install first.
    async fn installed_externals(&self, game: GameId)
        -> Result<Vec<InstalledExternal>, StoreError>;

    /// Full detail (including API surface) for the named installed
    /// externals.
    async fn read_externals(
        &self,
        game: GameId,
        names: &[String],
    ) -> Result<Vec<ExternalDetail>, StoreError>;
}

pub use memory::InMemoryAtomStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresAtomStore, PostgresConfig};
