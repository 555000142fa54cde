//! In-memory atom store for testing.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::embed::cosine_similarity;
use crate::error::StoreError;
use crate::types::{
    Atom, AtomName, AtomSnapshot, AtomType, BuildId, BuildRecord, BuildStatus, BuildSummary,
    DependencyEdge, ExternalDetail, Game, GameId, InstalledExternal, NewBuild, RegistryEntry,
};

use super::{AtomStore, AtomUpsert, RegistryRow, RestoredAtom};

#[derive(Debug, Clone)]
struct StoredAtom {
    atom: Atom,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
struct GameState {
    game: Game,
    /// Atoms by name; BTreeMap gives deterministic iteration order.
    atoms: BTreeMap<AtomName, StoredAtom>,
    /// Edges in insertion order.
    edges: Vec<DependencyEdge>,
    /// Builds in creation order.
    builds: Vec<BuildRecord>,
    /// Installed externals: (registry id, installed_at), in install order.
    installed: Vec<(Uuid, chrono::DateTime<Utc>)>,
}

#[derive(Debug, Default)]
struct Inner {
    games: BTreeMap<GameId, GameState>,
    registry: Vec<RegistryRow>,
}

/// In-memory atom store.
///
/// Uses BTreeMaps for deterministic iteration order and a single write lock,
/// so multi-row operations (`replace_edges`, `restore_atoms`) are atomic
/// from the perspective of concurrent readers.
#[derive(Debug, Default)]
pub struct InMemoryAtomStore {
    inner: RwLock<Inner>,
}

impl InMemoryAtomStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry row (tests and embedded use).
    pub fn add_registry_row(&self, row: RegistryRow) {
        let mut inner = self.inner.write();
        inner.registry.push(row);
        inner.registry.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));
    }

    fn installed_from_row(row: &RegistryRow, installed_at: chrono::DateTime<Utc>) -> InstalledExternal {
        InstalledExternal {
            name: row.entry.name.clone(),
            display_name: row.entry.display_name.clone(),
            package_name: row.entry.package_name.clone(),
            version: row.entry.version.clone(),
            cdn_url: row.entry.cdn_url.clone(),
            global_name: row.entry.global_name.clone(),
            description: row.entry.description.clone(),
            load_type: row.load_type.clone(),
            module_imports: row.module_imports.clone(),
            installed_at,
        }
    }
}

fn missing_game(id: GameId) -> StoreError {
    StoreError::Backend(format!("unknown game id: {id}"))
}

#[async_trait]
impl AtomStore for InMemoryAtomStore {
    async fn create_game(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Game, StoreError> {
        let mut inner = self.inner.write();
        if inner.games.values().any(|s| s.game.name == name) {
            return Err(StoreError::Backend(format!(
                "duplicate game name: \"{name}\""
            )));
        }
        let now = Utc::now();
        let game = Game {
            id: GameId::new(Uuid::new_v4()),
            name: name.to_string(),
            description: description.map(str::to_string),
            active_build_id: None,
            created_at: now,
            updated_at: now,
        };
        inner.games.insert(
            game.id,
            GameState {
                game: game.clone(),
                atoms: BTreeMap::new(),
                edges: Vec::new(),
                builds: Vec::new(),
                installed: Vec::new(),
            },
        );
        Ok(game)
    }

    async fn get_game(&self, id: GameId) -> Result<Option<Game>, StoreError> {
        Ok(self.inner.read().games.get(&id).map(|s| s.game.clone()))
    }

    async fn get_game_by_name(&self, name: &str) -> Result<Option<Game>, StoreError> {
        Ok(self
            .inner
            .read()
            .games
            .values()
            .find(|s| s.game.name == name)
            .map(|s| s.game.clone()))
    }

    async fn list_games(&self) -> Result<Vec<Game>, StoreError> {
        let inner = self.inner.read();
        let mut games: Vec<Game> = inner.games.values().map(|s| s.game.clone()).collect();
        games.sort_by_key(|g| g.created_at);
        Ok(games)
    }

    async fn set_active_build(&self, game: GameId, build: BuildId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        state.game.active_build_id = Some(build);
        state.game.updated_at = Utc::now();
        Ok(())
    }

    async fn list_atoms(
        &self,
        game: GameId,
        type_filter: Option<AtomType>,
    ) -> Result<Vec<Atom>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state
            .atoms
            .values()
            .filter(|s| type_filter.map_or(true, |t| s.atom.atom_type == t))
            .map(|s| s.atom.clone())
            .collect())
    }

    async fn get_atoms(&self, game: GameId, names: &[AtomName]) -> Result<Vec<Atom>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state
            .atoms
            .values()
            .filter(|s| names.contains(&s.atom.name))
            .map(|s| s.atom.clone())
            .collect())
    }

    async fn upsert_atom(&self, game: GameId, row: AtomUpsert) -> Result<Atom, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        let version = state
            .atoms
            .get(&row.name)
            .map(|existing| existing.atom.version + 1)
            .unwrap_or(1);
        let atom = Atom {
            name: row.name.clone(),
            atom_type: row.atom_type,
            code: row.code,
            description: row.description,
            inputs: row.inputs,
            outputs: row.outputs,
            version,
        };
        state.atoms.insert(
            row.name,
            StoredAtom {
                atom: atom.clone(),
                embedding: row.embedding,
            },
        );
        Ok(atom)
    }

    async fn delete_atom(&self, game: GameId, name: &AtomName) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        if state.atoms.remove(name).is_none() {
            return Ok(false);
        }
        state.edges.retain(|e| e.dependent != *name);
        Ok(true)
    }

    async fn list_edges(&self, game: GameId) -> Result<Vec<DependencyEdge>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state.edges.clone())
    }

    async fn edges_for(
        &self,
        game: GameId,
        names: &[AtomName],
    ) -> Result<Vec<DependencyEdge>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state
            .edges
            .iter()
            .filter(|e| names.contains(&e.dependent))
            .cloned()
            .collect())
    }

    async fn dependents_of(
        &self,
        game: GameId,
        name: &AtomName,
    ) -> Result<Vec<AtomName>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        let mut dependents: Vec<AtomName> = state
            .edges
            .iter()
            .filter(|e| e.depends_on == *name && e.dependent != *name)
            .map(|e| e.dependent.clone())
            .collect();
        dependents.sort();
        dependents.dedup();
        Ok(dependents)
    }

    async fn replace_edges(
        &self,
        game: GameId,
        dependent: &AtomName,
        depends_on: &[AtomName],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        state.edges.retain(|e| e.dependent != *dependent);
        state.edges.extend(
            depends_on
                .iter()
                .map(|target| DependencyEdge::new(dependent.clone(), target.clone())),
        );
        Ok(())
    }

    async fn create_build(&self, game: GameId) -> Result<BuildId, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        let build = BuildRecord {
            id: BuildId::new(Uuid::new_v4()),
            game_id: game,
            status: BuildStatus::Building,
            bundle_url: None,
            atom_count: None,
            error_message: None,
            build_log: Vec::new(),
            atom_snapshot: None,
            created_at: Utc::now(),
        };
        let id = build.id;
        state.builds.push(build);
        Ok(id)
    }

    async fn attach_snapshot(
        &self,
        game: GameId,
        build: BuildId,
        snapshot: &AtomSnapshot,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        let record = state
            .builds
            .iter_mut()
            .find(|b| b.id == build)
            .ok_or_else(|| StoreError::Backend(format!("unknown build id: {build}")))?;
        record.atom_snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn finalize_build_success(
        &self,
        game: GameId,
        build: BuildId,
        atom_count: u32,
        build_log: &[String],
        bundle_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        let record = state
            .builds
            .iter_mut()
            .find(|b| b.id == build)
            .ok_or_else(|| StoreError::Backend(format!("unknown build id: {build}")))?;
        record.status = BuildStatus::Success;
        record.atom_count = Some(atom_count);
        record.build_log = build_log.to_vec();
        record.bundle_url = bundle_url.map(str::to_string);
        Ok(())
    }

    async fn finalize_build_error(
        &self,
        game: GameId,
        build: BuildId,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        let record = state
            .builds
            .iter_mut()
            .find(|b| b.id == build)
            .ok_or_else(|| StoreError::Backend(format!("unknown build id: {build}")))?;
        record.status = BuildStatus::Error;
        record.error_message = Some(message.to_string());
        Ok(())
    }

    async fn insert_build(&self, game: GameId, build: NewBuild) -> Result<BuildId, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        let record = BuildRecord {
            id: BuildId::new(Uuid::new_v4()),
            game_id: game,
            status: build.status,
            bundle_url: None,
            atom_count: Some(build.atom_count),
            error_message: None,
            build_log: build.build_log,
            atom_snapshot: build.atom_snapshot,
            created_at: Utc::now(),
        };
        let id = record.id;
        state.builds.push(record);
        Ok(id)
    }

    async fn get_build(
        &self,
        game: GameId,
        build: BuildId,
    ) -> Result<Option<BuildRecord>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state.builds.iter().find(|b| b.id == build).cloned())
    }

    async fn list_builds(
        &self,
        game: GameId,
        limit: usize,
    ) -> Result<Vec<BuildSummary>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state
            .builds
            .iter()
            .rev()
            .take(limit)
            .map(|b| BuildSummary {
                id: b.id,
                status: b.status,
                bundle_url: b.bundle_url.clone(),
                atom_count: b.atom_count,
                error_message: b.error_message.clone(),
                created_at: b.created_at,
            })
            .collect())
    }

    async fn restore_atoms(
        &self,
        game: GameId,
        atoms: &[RestoredAtom],
        edges: &[DependencyEdge],
    ) -> Result<(), StoreError> {
        // Single write lock: readers never observe the half-restored state.
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        state.atoms.clear();
        state.edges.clear();
        for restored in atoms {
            let snapshot = &restored.atom;
            state.atoms.insert(
                snapshot.name.clone(),
                StoredAtom {
                    atom: Atom {
                        name: snapshot.name.clone(),
                        atom_type: snapshot.atom_type,
                        code: snapshot.code.clone(),
                        description: snapshot.description.clone(),
                        inputs: snapshot.inputs.clone(),
                        outputs: snapshot.outputs.clone(),
                        version: 1,
                    },
                    embedding: restored.embedding.clone(),
                },
            );
        }
        state.edges.extend(edges.iter().cloned());
        Ok(())
    }

    async fn search_by_embedding(
        &self,
        game: GameId,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(Atom, f32)>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        let mut hits: Vec<(Atom, f32)> = state
            .atoms
            .values()
            .map(|s| (s.atom.clone(), cosine_similarity(&s.embedding, query)))
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect();
        // Rank best-first; ties break by name for determinism.
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.name.cmp(&b.0.name))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn list_registry(&self) -> Result<Vec<RegistryEntry>, StoreError> {
        Ok(self
            .inner
            .read()
            .registry
            .iter()
            .map(|row| row.entry.clone())
            .collect())
    }

    async fn get_registry_entry(&self, name: &str) -> Result<Option<RegistryEntry>, StoreError> {
        Ok(self
            .inner
            .read()
            .registry
            .iter()
            .find(|row| row.entry.name == name)
            .map(|row| row.entry.clone()))
    }

    async fn install_external(
        &self,
        game: GameId,
        registry_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        if !inner.registry.iter().any(|row| row.entry.id == registry_id) {
            return Err(StoreError::Backend(format!(
                "unknown registry id: {registry_id}"
            )));
        }
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        if state.installed.iter().any(|(id, _)| *id == registry_id) {
            return Ok(false);
        }
        state.installed.push((registry_id, Utc::now()));
        Ok(true)
    }

    async fn uninstall_external(
        &self,
        game: GameId,
        registry_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let state = inner.games.get_mut(&game).ok_or_else(|| missing_game(game))?;
        let before = state.installed.len();
        state.installed.retain(|(id, _)| *id != registry_id);
        Ok(state.installed.len() < before)
    }

    async fn installed_externals(
        &self,
        game: GameId,
    ) -> Result<Vec<InstalledExternal>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state
            .installed
            .iter()
            .filter_map(|(id, installed_at)| {
                inner
                    .registry
                    .iter()
                    .find(|row| row.entry.id == *id)
                    .map(|row| Self::installed_from_row(row, *installed_at))
            })
            .collect())
    }

    async fn read_externals(
        &self,
        game: GameId,
        names: &[String],
    ) -> Result<Vec<ExternalDetail>, StoreError> {
        let inner = self.inner.read();
        let state = inner.games.get(&game).ok_or_else(|| missing_game(game))?;
        Ok(state
            .installed
            .iter()
            .filter_map(|(id, installed_at)| {
                inner
                    .registry
                    .iter()
                    .find(|row| row.entry.id == *id && names.contains(&row.entry.name))
                    .map(|row| ExternalDetail {
                        external: Self::installed_from_row(row, *installed_at),
                        api_surface: row.api_surface.clone(),
                    })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;

    fn upsert_row(name: &str, deps_code: &str) -> AtomUpsert {
        AtomUpsert {
            name: AtomName::raw(name),
            atom_type: AtomType::Util,
            code: deps_code.to_string(),
            description: None,
            inputs: vec![Port::new("v", "number")],
            outputs: vec![Port::new("out", "number")],
            embedding: vec![1.0, 0.0],
        }
    }

    async fn store_with_game() -> (InMemoryAtomStore, GameId) {
        let store = InMemoryAtomStore::new();
        let game = store.create_game("pong", None).await.unwrap();
        (store, game.id)
    }

    #[tokio::test]
    async fn test_upsert_bumps_version() {
        let (store, game) = store_with_game().await;

        let first = store.upsert_atom(game, upsert_row("math_clamp", "v1")).await.unwrap();
        assert_eq!(first.version, 1);

        let second = store.upsert_atom(game, upsert_row("math_clamp", "v2")).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.code, "v2");

        let fetched = store
            .get_atoms(game, &[AtomName::raw("math_clamp")])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].version, 2);
    }

    #[tokio::test]
    async fn test_get_atoms_returns_existing_subset() {
        let (store, game) = store_with_game().await;
        store.upsert_atom(game, upsert_row("a", "x")).await.unwrap();

        let fetched = store
            .get_atoms(game, &[AtomName::raw("a"), AtomName::raw("ghost")])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].name, AtomName::raw("a"));
    }

    #[tokio::test]
    async fn test_replace_edges_never_merges() {
        let (store, game) = store_with_game().await;
        for name in ["a", "b", "c", "d"] {
            store.upsert_atom(game, upsert_row(name, "x")).await.unwrap();
        }
        let d = AtomName::raw("d");

        store
            .replace_edges(game, &d, &[AtomName::raw("a"), AtomName::raw("b")])
            .await
            .unwrap();
        store
            .replace_edges(game, &d, &[AtomName::raw("c")])
            .await
            .unwrap();

        let edges = store.list_edges(game).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].depends_on, AtomName::raw("c"));
    }

    #[tokio::test]
    async fn test_dependents_of() {
        let (store, game) = store_with_game().await;
        for name in ["base", "user_one", "user_two"] {
            store.upsert_atom(game, upsert_row(name, "x")).await.unwrap();
        }
        let base = AtomName::raw("base");
        store
            .replace_edges(game, &AtomName::raw("user_one"), std::slice::from_ref(&base))
            .await
            .unwrap();
        store
            .replace_edges(game, &AtomName::raw("user_two"), std::slice::from_ref(&base))
            .await
            .unwrap();

        let dependents = store.dependents_of(game, &base).await.unwrap();
        assert_eq!(dependents, vec![AtomName::raw("user_one"), AtomName::raw("user_two")]);
    }

    #[tokio::test]
    async fn test_delete_atom_drops_outgoing_edges() {
        let (store, game) = store_with_game().await;
        store.upsert_atom(game, upsert_row("base", "x")).await.unwrap();
        store.upsert_atom(game, upsert_row("leaf", "x")).await.unwrap();
        store
            .replace_edges(game, &AtomName::raw("leaf"), &[AtomName::raw("base")])
            .await
            .unwrap();

        assert!(store.delete_atom(game, &AtomName::raw("leaf")).await.unwrap());
        assert!(store.list_edges(game).await.unwrap().is_empty());
        assert!(!store.delete_atom(game, &AtomName::raw("leaf")).await.unwrap());
    }

    #[tokio::test]
    async fn test_scope_isolation() {
        let store = InMemoryAtomStore::new();
        let pong = store.create_game("pong", None).await.unwrap();
        let breakout = store.create_game("breakout", None).await.unwrap();

        store
            .upsert_atom(pong.id, upsert_row("shared_name", "pong code"))
            .await
            .unwrap();

        assert!(store.list_atoms(breakout.id, None).await.unwrap().is_empty());
        let in_pong = store.list_atoms(pong.id, None).await.unwrap();
        assert_eq!(in_pong.len(), 1);
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let (store, game) = store_with_game().await;
        let mut close = upsert_row("close_match", "x");
        close.embedding = vec![1.0, 0.0];
        let mut far = upsert_row("far_match", "x");
        far.embedding = vec![0.0, 1.0];
        store.upsert_atom(game, close).await.unwrap();
        store.upsert_atom(game, far).await.unwrap();

        let hits = store
            .search_by_embedding(game, &[1.0, 0.0], 0.3, 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.name, AtomName::raw("close_match"));
        assert!(hits[0].1 > 0.99);
    }

    #[tokio::test]
    async fn test_build_lifecycle() {
        let (store, game) = store_with_game().await;
        let build = store.create_build(game).await.unwrap();

        let record = store.get_build(game, build).await.unwrap().unwrap();
        assert_eq!(record.status, BuildStatus::Building);

        store
            .finalize_build_success(game, build, 2, &["a".into(), "b".into()], Some("url"))
            .await
            .unwrap();
        let record = store.get_build(game, build).await.unwrap().unwrap();
        assert_eq!(record.status, BuildStatus::Success);
        assert_eq!(record.atom_count, Some(2));
        assert_eq!(record.build_log, vec!["a", "b"]);

        let listed = store.list_builds(game, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
