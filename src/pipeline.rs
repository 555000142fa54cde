//! Build pipeline: turns a game's atom set into a published bundle.
//!
//! State machine per build: `building -> success` or `building -> error`,
//! no other transitions. Any failure after the build row exists finalizes
//! the row as `error` before the failure propagates; a build is never left
//! in `building` with no explanation.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::bundle::{render_bundle, BundleManifest, BundlePaths};
use crate::error::{BlobError, KernelError};
use crate::snapshot;
use crate::sort::sort_atoms;
use crate::store::AtomStore;
use crate::types::{AtomName, BuildId, Game, GameId};

/// Result of a successful pipeline run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildOutcome {
    /// The build row this run created.
    pub build_id: BuildId,
    /// Number of atoms bundled.
    pub atom_count: u32,
    /// Dependency-respecting atom order.
    pub order: Vec<AtomName>,
    /// Public URL of the latest bundle, absent for empty games.
    pub bundle_url: Option<String>,
}

/// The build pipeline over a store and blob storage.
///
/// Each run is independent: concurrent runs for the same game each create
/// their own build row and race only on the `active_build_id` pointer
/// (last-writer-wins, accepted).
pub struct BuildPipeline<S> {
    store: Arc<S>,
    blobs: Arc<dyn BlobStore>,
}

impl<S: AtomStore> BuildPipeline<S> {
    /// Create a new pipeline.
    pub fn new(store: Arc<S>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// Run one build for `game_id`.
    pub async fn run(&self, game_id: GameId) -> Result<BuildOutcome, KernelError> {
        // 1. Resolve the game before creating any rows.
        let game = self
            .store
            .get_game(game_id)
            .await?
            .ok_or_else(|| KernelError::not_found(format!("Game not found: {game_id}")))?;

        tracing::info!(game_id = %game_id, game_name = %game.name, "rebuild: starting");

        // 2. Create the build row in `building` state.
        let build_id = self.store.create_build(game_id).await?;

        match self.execute(&game, build_id).await {
            Ok(outcome) => {
                tracing::info!(
                    build_id = %build_id,
                    game_id = %game_id,
                    atom_count = outcome.atom_count,
                    "rebuild: succeeded"
                );
                Ok(outcome)
            }
            Err(err) => {
                // Finalize before propagating so the row never stays
                // `building`.
                tracing::error!(build_id = %build_id, error = %err, "rebuild: failed");
                if let Err(finalize_err) = self
                    .store
                    .finalize_build_error(game_id, build_id, &err.to_string())
                    .await
                {
                    tracing::error!(
                        build_id = %build_id,
                        error = %finalize_err,
                        "rebuild: failed to finalize errored build"
                    );
                }
                Err(err)
            }
        }
    }

    /// Steps 3-12: everything after the build row exists.
    async fn execute(&self, game: &Game, build_id: BuildId) -> Result<BuildOutcome, KernelError> {
        let game_id = game.id;

        // 3. Snapshot before any mutation risk; attach it immediately so the
        // row carries one regardless of outcome.
        let snapshot = snapshot::capture(self.store.as_ref(), game_id).await?;
        self.store
            .attach_snapshot(game_id, build_id, &snapshot)
            .await?;

        // 4. Fetch atoms and edges.
        let atoms = self.store.list_atoms(game_id, None).await?;

        // 5. Empty game: finalize success with no artifact.
        if atoms.is_empty() {
            self.store
                .finalize_build_success(game_id, build_id, 0, &[], None)
                .await?;
            return Ok(BuildOutcome {
                build_id,
                atom_count: 0,
                order: Vec::new(),
                bundle_url: None,
            });
        }

        let edges = self.store.list_edges(game_id).await?;

        // 6. Topological sort; a cycle finalizes the build as error.
        let names: Vec<AtomName> = atoms.iter().map(|a| a.name.clone()).collect();
        let order = sort_atoms(&names, &edges)?;

        // 7. Render the bundle.
        let built_at = chrono::Utc::now().to_rfc3339();
        let bundle = render_bundle(&game.name, &atoms, &order, &built_at);

        // 8. Externals manifest.
        let installed = self.store.installed_externals(game_id).await?;
        let manifest = BundleManifest::new(&installed, &built_at);
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| BlobError::Transport(format!("manifest serialization: {e}")))?;

        // 9. Upload latest, versioned copy, and manifest.
        let paths = BundlePaths::for_build(&game.name, build_id);
        self.blobs
            .upload(
                &paths.latest,
                bundle.clone().into_bytes(),
                "application/javascript",
                "0",
            )
            .await?;
        self.blobs
            .upload(
                &paths.versioned,
                bundle.into_bytes(),
                "application/javascript",
                "3600",
            )
            .await?;
        self.blobs
            .upload(
                &paths.manifest,
                manifest_json.into_bytes(),
                "application/json",
                "0",
            )
            .await?;

        let bundle_url = self.blobs.public_url(&paths.latest);

        // 10. Finalize the build row.
        let log: Vec<String> = order.iter().map(|n| n.as_str().to_string()).collect();
        self.store
            .finalize_build_success(
                game_id,
                build_id,
                atoms.len() as u32,
                &log,
                Some(&bundle_url),
            )
            .await?;

        // 11. Point the game at this build. Last-writer-wins.
        self.store.set_active_build(game_id, build_id).await?;

        // 12. Report.
        Ok(BuildOutcome {
            build_id,
            atom_count: atoms.len() as u32,
            order,
            bundle_url: Some(bundle_url),
        })
    }
}
