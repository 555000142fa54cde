//! Service state: shared handles to the store and collaborators.

use std::sync::Arc;

use crate::atoms::AtomService;
use crate::blob::BlobStore;
use crate::embed::EmbeddingClient;
use crate::externals::ExternalService;
use crate::pipeline::BuildPipeline;
use crate::rollback::RollbackEngine;
use crate::store::AtomStore;
use crate::trigger::RebuildTrigger;

/// Shared service state.
///
/// Holds the store plus the three external collaborators. Engines are cheap
/// to construct, so handlers build them per request from these handles.
pub struct ServiceState<S: AtomStore + Send + Sync + 'static> {
    /// The atom store backend.
    pub store: Arc<S>,
    /// Embedding service client.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Blob storage client.
    pub blobs: Arc<dyn BlobStore>,
    /// Rebuild trigger transport.
    pub trigger: Arc<dyn RebuildTrigger>,
}

impl<S: AtomStore + Send + Sync + 'static> ServiceState<S> {
    /// Create new service state.
    pub fn new(
        store: S,
        embedder: Arc<dyn EmbeddingClient>,
        blobs: Arc<dyn BlobStore>,
        trigger: Arc<dyn RebuildTrigger>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            embedder,
            blobs,
            trigger,
        }
    }

    /// Atom CRUD + search service.
    pub fn atom_service(&self) -> AtomService<S> {
        AtomService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            Arc::clone(&self.trigger),
        )
    }

    /// Build pipeline.
    pub fn pipeline(&self) -> BuildPipeline<S> {
        BuildPipeline::new(Arc::clone(&self.store), Arc::clone(&self.blobs))
    }

    /// Rollback engine.
    pub fn rollback_engine(&self) -> RollbackEngine<S> {
        RollbackEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            Arc::clone(&self.trigger),
        )
    }

    /// External library service.
    pub fn external_service(&self) -> ExternalService<S> {
        ExternalService::new(Arc::clone(&self.store), Arc::clone(&self.trigger))
    }
}

impl<S: AtomStore + Send + Sync + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
            blobs: Arc::clone(&self.blobs),
            trigger: Arc::clone(&self.trigger),
        }
    }
}
