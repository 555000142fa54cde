//! Atom store adapter: CRUD and semantic search over a game's atoms.
//!
//! Enforces the referential-integrity rules (no dangling dependency, no
//! delete of a depended-upon atom) and owns the validation surface. All
//! validation failures name the offending identifiers.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embed::{embedding_text, EmbeddingClient};
use crate::error::KernelError;
use crate::store::{AtomStore, AtomUpsert};
use crate::trigger::RebuildTrigger;
use crate::types::{
    format_signature, AtomFull, AtomName, AtomSummary, AtomType, GameId, Port, SearchHit,
    MAX_ATOM_CODE_BYTES,
};

/// Minimum cosine similarity for a semantic search hit.
pub const SEARCH_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Input to an atom upsert.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpsertAtomInput {
    /// Atom name.
    pub name: String,
    /// Code body.
    pub code: String,
    /// Atom kind.
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    /// Input ports.
    #[serde(default)]
    pub inputs: Vec<Port>,
    /// Output ports.
    #[serde(default)]
    pub outputs: Vec<Port>,
    /// Names of atoms this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// What an upsert hands back to the agent.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpsertReceipt {
    /// Atom name.
    pub name: AtomName,
    /// Rendered call signature.
    pub signature: String,
    /// Stored dependency names.
    pub dependencies: Vec<AtomName>,
}

/// Service over atom storage, the embedding collaborator, and the rebuild
/// trigger.
pub struct AtomService<S> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingClient>,
    trigger: Arc<dyn RebuildTrigger>,
}

impl<S: AtomStore> AtomService<S> {
    /// Create a new service.
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

    /// Get the code structure for a game: summaries without code bodies.
    pub async fn list_structure(
        &self,
        game: GameId,
        type_filter: Option<AtomType>,
    ) -> Result<Vec<AtomSummary>, KernelError> {
        let atoms = self.store.list_atoms(game, type_filter).await?;
        let names: Vec<AtomName> = atoms.iter().map(|a| a.name.clone()).collect();
        let edges = self.store.edges_for(game, &names).await?;

        Ok(atoms
            .into_iter()
            .map(|atom| {
                let depends_on = edges
                    .iter()
                    .filter(|e| e.dependent == atom.name)
                    .map(|e| e.depends_on.clone())
                    .collect();
                AtomSummary {
                    name: atom.name,
                    atom_type: atom.atom_type,
                    inputs: atom.inputs,
                    outputs: atom.outputs,
                    depends_on,
                }
            })
            .collect())
    }

    /// Read full records for the named atoms.
    ///
    /// Returns only the subset that exists; unknown names are not an error.
    pub async fn read_atoms(
        &self,
        game: GameId,
        names: &[AtomName],
    ) -> Result<Vec<AtomFull>, KernelError> {
        let atoms = self.store.get_atoms(game, names).await?;
        if atoms.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<AtomName> = atoms.iter().map(|a| a.name.clone()).collect();
        let edges = self.store.edges_for(game, &found).await?;

        Ok(atoms
            .into_iter()
            .map(|atom| {
                let depends_on = edges
                    .iter()
                    .filter(|e| e.dependent == atom.name)
                    .map(|e| e.depends_on.clone())
                    .collect();
                AtomFull::from_atom(atom, depends_on)
            })
            .collect())
    }

    /// Create or update an atom.
    pub async fn upsert(
        &self,
        game: GameId,
        input: UpsertAtomInput,
    ) -> Result<UpsertReceipt, KernelError> {
        let name = AtomName::parse(input.name)?;

        // 1. Code size cap, naming the overage.
        let code_bytes = input.code.len();
        if code_bytes > MAX_ATOM_CODE_BYTES {
            return Err(KernelError::validation(format!(
                "Code is {code_bytes} bytes (limit: {MAX_ATOM_CODE_BYTES}). Break this into smaller atoms."
            )));
        }

        // 2. Every declared dependency (excluding self) must already exist.
        let mut dependencies = Vec::with_capacity(input.dependencies.len());
        for dep in input.dependencies {
            dependencies.push(AtomName::parse(dep)?);
        }
        let to_check: Vec<AtomName> = dependencies
            .iter()
            .filter(|dep| **dep != name)
            .cloned()
            .collect();
        if !to_check.is_empty() {
            let existing: BTreeSet<AtomName> = self
                .store
                .get_atoms(game, &to_check)
                .await?
                .into_iter()
                .map(|a| a.name)
                .collect();
            let missing: Vec<&str> = to_check
                .iter()
                .filter(|dep| !existing.contains(*dep))
                .map(|dep| dep.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(KernelError::validation(format!(
                    "Dependencies not found: {}. Create them first.",
                    missing.join(", ")
                )));
            }
        }

        // 3. Embed name + signature + description + code.
        tracing::debug!(name = %name, "upsert: generating embedding");
        let text = embedding_text(
            name.as_str(),
            &input.inputs,
            &input.outputs,
            input.description.as_deref(),
            &input.code,
        );
        let embedding = self.embedder.embed(&text).await?;

        // 4. Upsert the row; the store bumps the version.
        tracing::debug!(name = %name, game_id = %game, "upsert: writing to store");
        self.store
            .upsert_atom(
                game,
                AtomUpsert {
                    name: name.clone(),
                    atom_type: input.atom_type,
                    code: input.code,
                    description: input.description,
                    inputs: input.inputs.clone(),
                    outputs: input.outputs.clone(),
                    embedding,
                },
            )
            .await?;

        // 5. Replace all outgoing edges in one operation.
        self.store.replace_edges(game, &name, &dependencies).await?;

        // 6. Fire-and-forget rebuild.
        self.trigger.request_rebuild(game).await;

        let signature = format_signature(&input.inputs, &input.outputs);
        Ok(UpsertReceipt {
            name,
            signature,
            dependencies,
        })
    }

    /// Delete an atom. Refused while any other atom depends on it.
    pub async fn delete(&self, game: GameId, name: &AtomName) -> Result<(), KernelError> {
        let dependents = self.store.dependents_of(game, name).await?;
        if !dependents.is_empty() {
            let list: Vec<&str> = dependents.iter().map(AtomName::as_str).collect();
            return Err(KernelError::validation(format!(
                "Cannot delete \"{name}\": used by [{}]. Update or delete those atoms first.",
                list.join(", ")
            )));
        }

        if !self.store.delete_atom(game, name).await? {
            return Err(KernelError::not_found(format!("Atom \"{name}\" not found.")));
        }

        self.trigger.request_rebuild(game).await;
        Ok(())
    }

    /// Search atoms by meaning.
    pub async fn search(
        &self,
        game: GameId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, KernelError> {
        let query_embedding = self.embedder.embed(query).await?;
        let hits = self
            .store
            .search_by_embedding(game, &query_embedding, SEARCH_SIMILARITY_THRESHOLD, limit)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let names: Vec<AtomName> = hits.iter().map(|(a, _)| a.name.clone()).collect();
        let edges = self.store.edges_for(game, &names).await?;

        Ok(hits
            .into_iter()
            .map(|(atom, similarity)| {
                let depends_on = edges
                    .iter()
                    .filter(|e| e.dependent == atom.name)
                    .map(|e| e.depends_on.clone())
                    .collect();
                let mut full = AtomFull::from_atom(atom, depends_on);
                // Version is not meaningful for search results.
                full.version = 0;
                SearchHit {
                    atom: full,
                    similarity,
                }
            })
            .collect())
    }
}
