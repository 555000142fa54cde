//! Integration tests for the build pipeline.
//!
//! These run against the in-memory store, blob store, and embedder, so the
//! full path (snapshot, sort, render, upload, finalize, activate) is
//! exercised without external services.

use std::sync::Arc;

use atomforge::atoms::UpsertAtomInput;
use atomforge::blob::{BlobStore, InMemoryBlobStore};
use atomforge::error::{BlobError, KernelError};
use atomforge::store::AtomStore;
use atomforge::types::{AtomName, AtomType, BuildStatus, GameId, Port};
use atomforge::{
    AtomService, BuildPipeline, HashEmbedder, InMemoryAtomStore, NullRebuildTrigger,
};
use async_trait::async_trait;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<InMemoryAtomStore>,
    blobs: Arc<InMemoryBlobStore>,
    atoms: AtomService<InMemoryAtomStore>,
    pipeline: BuildPipeline<InMemoryAtomStore>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryAtomStore::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let atoms = AtomService::new(
        Arc::clone(&store),
        Arc::new(HashEmbedder::new()),
        Arc::new(NullRebuildTrigger),
    );
    let pipeline = BuildPipeline::new(Arc::clone(&store), Arc::clone(&blobs) as Arc<dyn BlobStore>);
    Harness {
        store,
        blobs,
        atoms,
        pipeline,
    }
}

fn upsert(name: &str, atom_type: AtomType, code: &str, deps: &[&str]) -> UpsertAtomInput {
    UpsertAtomInput {
        name: name.to_string(),
        code: code.to_string(),
        atom_type,
        inputs: vec![Port::new("v", "number")],
        outputs: vec![Port::new("out", "number")],
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
        description: None,
    }
}

/// Blob store whose uploads always fail.
struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn upload(
        &self,
        path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
        _cache_control: &str,
    ) -> Result<(), BlobError> {
        Err(BlobError::Upload {
            path: path.to_string(),
            message: "storage unavailable".to_string(),
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://bundles/{path}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_game_builds_successfully_without_artifacts() {
    let h = harness();
    let game = h.store.create_game("fresh", None).await.unwrap();

    let outcome = h.pipeline.run(game.id).await.unwrap();

    assert_eq!(outcome.atom_count, 0);
    assert!(outcome.order.is_empty());
    assert!(outcome.bundle_url.is_none());
    assert!(h.blobs.is_empty());

    let record = h.store.get_build(game.id, outcome.build_id).await.unwrap().unwrap();
    assert_eq!(record.status, BuildStatus::Success);
    assert_eq!(record.atom_count, Some(0));
    assert!(record.bundle_url.is_none());
    assert!(record.build_log.is_empty());
    // Snapshot captured even for an empty game.
    assert!(record.atom_snapshot.is_some());

    // Empty builds do not move the active pointer.
    let game = h.store.get_game(game.id).await.unwrap().unwrap();
    assert!(game.active_build_id.is_none());
}

#[tokio::test]
async fn test_two_atom_build_orders_bundle_and_log() {
    let h = harness();
    let game = h.store.create_game("pong", None).await.unwrap();

    h.atoms
        .upsert(
            game.id,
            upsert(
                "math_clamp",
                AtomType::Util,
                "function math_clamp(v, lo, hi) { return Math.min(hi, Math.max(lo, v)); }",
                &[],
            ),
        )
        .await
        .unwrap();
    h.atoms
        .upsert(
            game.id,
            upsert(
                "player_jump",
                AtomType::Feature,
                "function player_jump(p) { p.vy = math_clamp(p.vy - 10, -20, 0); }",
                &["math_clamp"],
            ),
        )
        .await
        .unwrap();

    let outcome = h.pipeline.run(game.id).await.unwrap();

    assert_eq!(outcome.atom_count, 2);
    assert_eq!(
        outcome.order,
        vec![AtomName::parse("math_clamp").unwrap(), AtomName::parse("player_jump").unwrap()]
    );

    // Three artifacts under the game's prefix.
    let latest = h.blobs.get("pong/latest.js").expect("latest artifact");
    let versioned_path = format!("pong/build_{}.js", outcome.build_id);
    let versioned = h.blobs.get(&versioned_path).expect("versioned artifact");
    let manifest = h.blobs.get("pong/manifest.json").expect("manifest artifact");

    assert_eq!(latest.content_type, "application/javascript");
    assert_eq!(latest.cache_control, "0");
    assert_eq!(versioned.cache_control, "3600");
    assert_eq!(manifest.content_type, "application/json");
    assert_eq!(manifest.cache_control, "0");
    assert_eq!(latest.bytes, versioned.bytes);

    // Bundle body contains both atoms, dependency first, inside the IIFE.
    let bundle = String::from_utf8(latest.bytes).unwrap();
    let clamp_at = bundle.find("function math_clamp").unwrap();
    let jump_at = bundle.find("function player_jump").unwrap();
    assert!(clamp_at < jump_at);
    assert!(bundle.contains("(function() {"));
    assert!(bundle.contains("\"use strict\";"));

    // Manifest lists the canonical bundle filename.
    let manifest_json: serde_json::Value = serde_json::from_slice(&manifest.bytes).unwrap();
    assert_eq!(manifest_json["bundle_url"], "latest.js");
    assert_eq!(manifest_json["externals"], serde_json::json!([]));

    // Build row finalized with the sorted name sequence.
    let record = h.store.get_build(game.id, outcome.build_id).await.unwrap().unwrap();
    assert_eq!(record.status, BuildStatus::Success);
    assert_eq!(record.build_log, vec!["math_clamp", "player_jump"]);
    assert_eq!(record.bundle_url, outcome.bundle_url);
    assert!(record.atom_snapshot.is_some());

    // Active pointer moved to this build.
    let game = h.store.get_game(game.id).await.unwrap().unwrap();
    assert_eq!(game.active_build_id, Some(outcome.build_id));
}

#[tokio::test]
async fn test_cycle_finalizes_build_as_error_and_writes_nothing() {
    let h = harness();
    let game = h.store.create_game("tangled", None).await.unwrap();

    h.atoms
        .upsert(game.id, upsert("loop_a", AtomType::Util, "function loop_a() {}", &[]))
        .await
        .unwrap();
    h.atoms
        .upsert(game.id, upsert("loop_b", AtomType::Util, "function loop_b() {}", &["loop_a"]))
        .await
        .unwrap();
    // Close the cycle: loop_a now depends on loop_b.
    h.atoms
        .upsert(game.id, upsert("loop_a", AtomType::Util, "function loop_a() {}", &["loop_b"]))
        .await
        .unwrap();

    let err = h.pipeline.run(game.id).await.unwrap_err();
    assert!(matches!(err, KernelError::Cycle(_)));

    let builds = h.store.list_builds(game.id, 10).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].status, BuildStatus::Error);
    let message = builds[0].error_message.as_deref().unwrap();
    assert!(message.contains("loop_a"));
    assert!(message.contains("loop_b"));

    // No artifact paths were written.
    assert!(h.blobs.is_empty());

    // The snapshot still landed on the errored build.
    let record = h.store.get_build(game.id, builds[0].id).await.unwrap().unwrap();
    assert!(record.atom_snapshot.is_some());

    // Active pointer untouched.
    let game = h.store.get_game(game.id).await.unwrap().unwrap();
    assert!(game.active_build_id.is_none());
}

#[tokio::test]
async fn test_unknown_game_fails_fast() {
    let h = harness();
    let err = h.pipeline.run(GameId::new(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, KernelError::NotFound(_)));
}

#[tokio::test]
async fn test_upload_failure_finalizes_build_as_error() {
    let store = Arc::new(InMemoryAtomStore::new());
    let atoms = AtomService::new(
        Arc::clone(&store),
        Arc::new(HashEmbedder::new()),
        Arc::new(NullRebuildTrigger),
    );
    let pipeline = BuildPipeline::new(Arc::clone(&store), Arc::new(FailingBlobStore));

    let game = store.create_game("pong", None).await.unwrap();
    atoms
        .upsert(game.id, upsert("solo", AtomType::Util, "function solo() {}", &[]))
        .await
        .unwrap();

    let err = pipeline.run(game.id).await.unwrap_err();
    assert!(matches!(err, KernelError::Blob(_)));

    let builds = store.list_builds(game.id, 10).await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].status, BuildStatus::Error);
    assert!(builds[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("storage unavailable"));
}

#[tokio::test]
async fn test_boot_section_selects_core_entry_point() {
    let h = harness();
    let game = h.store.create_game("pong", None).await.unwrap();

    h.atoms
        .upsert(game.id, upsert("helper", AtomType::Util, "function helper() {}", &[]))
        .await
        .unwrap();
    h.atoms
        .upsert(
            game.id,
            upsert("game_loop", AtomType::Core, "function game_loop() { helper(); }", &["helper"]),
        )
        .await
        .unwrap();

    h.pipeline.run(game.id).await.unwrap();

    let bundle = String::from_utf8(h.blobs.get("pong/latest.js").unwrap().bytes).unwrap();
    assert!(bundle.contains("if (typeof game_loop === 'function') game_loop();"));
}

#[tokio::test]
async fn test_successive_builds_each_get_their_own_row() {
    let h = harness();
    let game = h.store.create_game("pong", None).await.unwrap();
    h.atoms
        .upsert(game.id, upsert("solo", AtomType::Util, "function solo() {}", &[]))
        .await
        .unwrap();

    let first = h.pipeline.run(game.id).await.unwrap();
    let second = h.pipeline.run(game.id).await.unwrap();

    assert_ne!(first.build_id, second.build_id);
    assert_eq!(h.store.list_builds(game.id, 10).await.unwrap().len(), 2);

    // Last writer wins the pointer.
    let game = h.store.get_game(game.id).await.unwrap().unwrap();
    assert_eq!(game.active_build_id, Some(second.build_id));

    // Both versioned artifacts remain addressable.
    assert!(h.blobs.get(&format!("pong/build_{}.js", first.build_id)).is_some());
    assert!(h.blobs.get(&format!("pong/build_{}.js", second.build_id)).is_some());
}
