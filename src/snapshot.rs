//! Snapshot engine: point-in-time capture of a game's atom and edge set.
//!
//! Snapshots are the unit of rollback. Capture is read-only, idempotent, and
//! excludes embeddings; those are regenerated on restore.

use crate::error::StoreError;
use crate::store::AtomStore;
use crate::types::{AtomSnapshot, GameId, SnapshotAtom};

/// Capture the game's full current atom and edge set as one immutable value.
///
/// Atoms come back in name order and edges in insertion order, so capturing
/// twice against an unchanged game yields identical snapshots.
pub async fn capture<S: AtomStore + ?Sized>(
    store: &S,
    game: GameId,
) -> Result<AtomSnapshot, StoreError> {
    let atoms = store.list_atoms(game, None).await?;
    let dependencies = store.list_edges(game).await?;
    Ok(AtomSnapshot {
        atoms: atoms.into_iter().map(SnapshotAtom::from).collect(),
        dependencies,
    })
}
