//! Integration tests for the rollback engine.

use std::sync::Arc;

use atomforge::atoms::UpsertAtomInput;
use atomforge::blob::{BlobStore, InMemoryBlobStore};
use atomforge::error::KernelError;
use atomforge::rollback::CHECKPOINT_LOG_ENTRY;
use atomforge::store::AtomStore;
use atomforge::types::{
    AtomName, AtomType, BuildId, BuildStatus, DependencyEdge, NewBuild, Port,
};
use atomforge::{
    AtomService, BuildPipeline, HashEmbedder, InMemoryAtomStore, NullRebuildTrigger,
    RollbackEngine,
};
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryAtomStore>,
    atoms: AtomService<InMemoryAtomStore>,
    pipeline: BuildPipeline<InMemoryAtomStore>,
    rollback: RollbackEngine<InMemoryAtomStore>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryAtomStore::new());
    let embedder = Arc::new(HashEmbedder::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let atoms = AtomService::new(
        Arc::clone(&store),
        embedder.clone(),
        Arc::new(NullRebuildTrigger),
    );
    let pipeline = BuildPipeline::new(Arc::clone(&store), blobs as Arc<dyn BlobStore>);
    let rollback = RollbackEngine::new(Arc::clone(&store), embedder, Arc::new(NullRebuildTrigger));
    Harness {
        store,
        atoms,
        pipeline,
        rollback,
    }
}

fn upsert(name: &str, code: &str, deps: &[&str]) -> UpsertAtomInput {
    UpsertAtomInput {
        name: name.to_string(),
        code: code.to_string(),
        atom_type: AtomType::Util,
        inputs: vec![Port::new("v", "number")],
        outputs: vec![],
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
        description: None,
    }
}

#[tokio::test]
async fn test_rollback_round_trip_restores_snapshot_state() {
    let h = harness();
    let game = h.store.create_game("pong", None).await.unwrap();

    // Snapshot S: atoms {p, q}, edge (q -> p).
    h.atoms.upsert(game.id, upsert("p", "function p() { return 1; }", &[])).await.unwrap();
    h.atoms.upsert(game.id, upsert("q", "function q() { return p(); }", &["p"])).await.unwrap();
    let target = h.pipeline.run(game.id).await.unwrap();

    // Mutate arbitrarily: replace p's code, add r, drop q's edge.
    h.atoms.upsert(game.id, upsert("p", "function p() { return 999; }", &[])).await.unwrap();
    h.atoms.upsert(game.id, upsert("r", "function r() {}", &[])).await.unwrap();
    h.atoms.upsert(game.id, upsert("q", "function q() { return 0; }", &[])).await.unwrap();

    let outcome = h.rollback.run(game.id, target.build_id).await.unwrap();
    assert_eq!(outcome.restored_atom_count, 2);

    // Live set equals S: names, types, code, edges.
    let atoms = h.store.list_atoms(game.id, None).await.unwrap();
    let names: Vec<&str> = atoms.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["p", "q"]);
    let p = atoms.iter().find(|a| a.name.as_str() == "p").unwrap();
    assert_eq!(p.code, "function p() { return 1; }");

    let edges = h.store.list_edges(game.id).await.unwrap();
    assert_eq!(
        edges,
        vec![DependencyEdge::new(
            AtomName::parse("q").unwrap(),
            AtomName::parse("p").unwrap()
        )]
    );

    // A checkpoint build captured the pre-rollback state.
    let checkpoint = h
        .store
        .get_build(game.id, outcome.checkpoint_build_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.status, BuildStatus::Success);
    assert_eq!(checkpoint.build_log, vec![CHECKPOINT_LOG_ENTRY]);
    let checkpoint_snapshot = checkpoint.atom_snapshot.unwrap();
    assert_eq!(checkpoint_snapshot.atom_count(), 3);
    let mutated_p = checkpoint_snapshot
        .atoms
        .iter()
        .find(|a| a.name.as_str() == "p")
        .unwrap();
    assert_eq!(mutated_p.code, "function p() { return 999; }");

    // Active pointer targets the rolled-back-to build, not the checkpoint.
    let game = h.store.get_game(game.id).await.unwrap().unwrap();
    assert_eq!(game.active_build_id, Some(target.build_id));
}

#[tokio::test]
async fn test_rollback_can_be_undone_via_checkpoint() {
    let h = harness();
    let game = h.store.create_game("pong", None).await.unwrap();

    h.atoms.upsert(game.id, upsert("p", "function p() { return 1; }", &[])).await.unwrap();
    let original = h.pipeline.run(game.id).await.unwrap();

    h.atoms.upsert(game.id, upsert("extra", "function extra() {}", &[])).await.unwrap();

    let first = h.rollback.run(game.id, original.build_id).await.unwrap();
    assert_eq!(h.store.list_atoms(game.id, None).await.unwrap().len(), 1);

    // Rolling back to the checkpoint restores the mutated state.
    let second = h.rollback.run(game.id, first.checkpoint_build_id).await.unwrap();
    assert_eq!(second.restored_atom_count, 2);
    let names: Vec<String> = h
        .store
        .list_atoms(game.id, None)
        .await
        .unwrap()
        .iter()
        .map(|a| a.name.as_str().to_string())
        .collect();
    assert_eq!(names, vec!["extra", "p"]);
}

#[tokio::test]
async fn test_rollback_rejects_unknown_build() {
    let h = harness();
    let game = h.store.create_game("pong", None).await.unwrap();

    let err = h
        .rollback
        .run(game.id, BuildId::new(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::NotFound(_)));
}

#[tokio::test]
async fn test_rollback_rejects_build_without_snapshot() {
    let h = harness();
    let game = h.store.create_game("pong", None).await.unwrap();

    // A legacy build row with no snapshot attached.
    let legacy = h
        .store
        .insert_build(
            game.id,
            NewBuild {
                status: BuildStatus::Success,
                atom_count: 0,
                build_log: vec![],
                atom_snapshot: None,
            },
        )
        .await
        .unwrap();

    let err = h.rollback.run(game.id, legacy).await.unwrap_err();
    match err {
        KernelError::NotFound(message) => assert!(message.contains("no atom snapshot")),
        other => panic!("expected not-found error, got {other:?}"),
    }

    // Nothing was checkpointed or destroyed.
    assert_eq!(h.store.list_builds(game.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rollback_is_scoped_to_the_game() {
    let h = harness();
    let pong = h.store.create_game("pong", None).await.unwrap();
    let other = h.store.create_game("other", None).await.unwrap();

    h.atoms.upsert(pong.id, upsert("p", "function p() {}", &[])).await.unwrap();
    let pong_build = h.pipeline.run(pong.id).await.unwrap();

    // A build from another game is not a valid target.
    let err = h.rollback.run(other.id, pong_build.build_id).await.unwrap_err();
    assert!(matches!(err, KernelError::NotFound(_)));
}
