//! Error taxonomy for the build core.
//!
//! Four caller-visible families: validation errors (bad input, never retried),
//! not-found errors (missing game/atom/build), cycle errors (from the sorter),
//! and upstream errors (storage, embedding service, blob storage). Transport
//! layers map each family to a distinct response class.

use crate::sort::CycleError;

/// Error from a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Generic backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Database failure.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error from the embedding service collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// The service responded with a non-success status.
    #[error("embedding service error ({status}): {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request never reached the service.
    #[error("embedding transport error: {0}")]
    Transport(String),

    /// Required configuration is missing.
    #[error("embedding client misconfigured: {0}")]
    Config(String),
}

/// Error from the blob storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Upload rejected or failed.
    #[error("blob upload failed for \"{path}\": {message}")]
    Upload {
        /// Artifact path that failed.
        path: String,
        /// Failure detail.
        message: String,
    },

    /// The request never reached the storage service.
    #[error("blob transport error: {0}")]
    Transport(String),
}

/// Crate-level error covering the full taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Input failed validation; message names the offending identifiers.
    #[error("{0}")]
    Validation(String),

    /// A referenced game, atom, or build does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The dependency graph contains a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Embedding service failure.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Blob storage failure.
    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl KernelError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<crate::types::InvalidAtomName> for KernelError {
    fn from(err: crate::types::InvalidAtomName) -> Self {
        Self::Validation(err.to_string())
    }
}
