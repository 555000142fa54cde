//! Rollback engine: restore a game's live atom set from a prior build's
//! snapshot.
//!
//! Rollback checkpoints the current state first, so the rollback itself can
//! be undone, then replaces the live set with the snapshot's contents and
//! kicks a rebuild. Embeddings are not preserved across snapshot boundaries;
//! they are regenerated for every restored atom *before* the destructive
//! phase, and the restore lands as one store operation.

use std::sync::Arc;

use crate::embed::{embedding_text, EmbeddingClient};
use crate::error::KernelError;
use crate::snapshot;
use crate::store::{AtomStore, RestoredAtom};
use crate::trigger::RebuildTrigger;
use crate::types::{BuildId, BuildStatus, GameId, NewBuild};

/// Log entry written to the automatic pre-rollback checkpoint build.
pub const CHECKPOINT_LOG_ENTRY: &str = "auto-checkpoint before rollback";

/// Result of a successful rollback.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RollbackOutcome {
    /// Checkpoint build holding the pre-rollback state.
    #[serde(rename = "checkpointBuildId")]
    pub checkpoint_build_id: BuildId,
    /// Number of atoms restored from the target snapshot.
    #[serde(rename = "restoredAtomCount")]
    pub restored_atom_count: usize,
}

/// The rollback engine over a store, the embedding collaborator, and the
/// rebuild trigger.
pub struct RollbackEngine<S> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingClient>,
    trigger: Arc<dyn RebuildTrigger>,
}

impl<S: AtomStore> RollbackEngine<S> {
    /// Create a new engine.
    pub fn new(
        store: Arc<S>,
        embedder: Arc<dyn EmbeddingClient>,
        trigger: Arc<dyn RebuildTrigger>,
    ) -> Self {
        Self {
            store,
            embedder,
            trigger,
        }
    }

    /// Roll `game_id` back to the snapshot carried by `target_build_id`.
    pub async fn run(
        &self,
        game_id: GameId,
        target_build_id: BuildId,
    ) -> Result<RollbackOutcome, KernelError> {
        // 1. Load the target build, scoped to the game.
        let target = self
            .store
            .get_build(game_id, target_build_id)
            .await?
            .ok_or_else(|| {
                KernelError::not_found(format!(
                    "Build \"{target_build_id}\" not found for this game."
                ))
            })?;

        let target_snapshot = target.atom_snapshot.ok_or_else(|| {
            KernelError::not_found(format!(
                "Build \"{target_build_id}\" has no atom snapshot. Only builds created after \
                 the snapshot feature can be rolled back to."
            ))
        })?;

        // 2. Checkpoint the current state as a new successful build.
        tracing::info!(game_id = %game_id, target_build_id = %target_build_id, "rollback: saving checkpoint");
        let current = snapshot::capture(self.store.as_ref(), game_id).await?;
        let checkpoint_build_id = self
            .store
            .insert_build(
                game_id,
                NewBuild {
                    status: BuildStatus::Success,
                    atom_count: current.atom_count() as u32,
                    build_log: vec![CHECKPOINT_LOG_ENTRY.to_string()],
                    atom_snapshot: Some(current),
                },
            )
            .await?;

        // 3. Regenerate embeddings before touching the live set, so an
        // embedding failure aborts the rollback with nothing destroyed.
        tracing::info!(
            game_id = %game_id,
            atom_count = target_snapshot.atoms.len(),
            "rollback: regenerating embeddings"
        );
        let mut restored = Vec::with_capacity(target_snapshot.atoms.len());
        for atom in &target_snapshot.atoms {
            let text = embedding_text(
                atom.name.as_str(),
                &atom.inputs,
                &atom.outputs,
                atom.description.as_deref(),
                &atom.code,
            );
            let embedding = self.embedder.embed(&text).await?;
            restored.push(RestoredAtom {
                atom: atom.clone(),
                embedding,
            });
        }

        // 4-5. Replace the live atom and edge set in one store operation.
        tracing::info!(game_id = %game_id, "rollback: restoring atoms");
        self.store
            .restore_atoms(game_id, &restored, &target_snapshot.dependencies)
            .await?;

        // 6. Point the game at the *target* build, not the checkpoint.
        self.store.set_active_build(game_id, target_build_id).await?;

        // 7. Kick a rebuild; rollback success does not depend on it.
        tracing::info!(game_id = %game_id, "rollback: triggering rebuild");
        self.trigger.request_rebuild(game_id).await;

        tracing::info!(
            game_id = %game_id,
            target_build_id = %target_build_id,
            checkpoint_build_id = %checkpoint_build_id,
            restored_atoms = restored.len(),
            "rollback: complete"
        );

        Ok(RollbackOutcome {
            checkpoint_build_id,
            restored_atom_count: restored.len(),
        })
    }
}
