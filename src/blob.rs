//! Blob storage collaborator for build artifacts.
//!
//! Bundles and manifests are uploaded under game-scoped paths and served via
//! public URLs. Production talks to an object-storage HTTP API; tests use the
//! in-memory store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::error::BlobError;

/// Contract for the external blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `bytes` at `path`, overwriting any existing object.
    ///
    /// `cache_control` is the max-age value in seconds ("0" disables
    /// caching).
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), BlobError>;

    /// Public URL an object at `path` is served from.
    fn public_url(&self, path: &str) -> String;
}

/// An object held by the in-memory store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object bytes.
    pub bytes: Vec<u8>,
    /// Declared content type.
    pub content_type: String,
    /// Declared cache policy.
    pub cache_control: String,
}

/// In-memory blob store for tests.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl InMemoryBlobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch an object by path.
    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().get(path).cloned()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), BlobError> {
        self.objects.lock().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                cache_control: cache_control.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://bundles/{path}")
    }
}

/// HTTP object-storage client.
///
/// Uploads via `POST {api_url}/object/{bucket}/{path}` with an `x-upsert`
/// header for overwrite semantics; objects are served from
/// `{api_url}/object/public/{bucket}/{path}`.
///
/// ## Configuration
///
/// - `STORAGE_API_URL`: storage API base URL (required)
/// - `STORAGE_BUCKET`: bucket name (default: "bundles")
/// - `STORAGE_SERVICE_KEY`: bearer token (required)
#[cfg(feature = "remote")]
pub struct HttpBlobStore {
    http: reqwest::Client,
    api_url: String,
    bucket: String,
    service_key: String,
}

#[cfg(feature = "remote")]
impl HttpBlobStore {
    /// Create a client with explicit settings.
    pub fn new(
        api_url: impl Into<String>,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            bucket: bucket.into(),
            service_key: service_key.into(),
        }
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self, BlobError> {
        let api_url = std::env::var("STORAGE_API_URL")
            .map_err(|_| BlobError::Transport("STORAGE_API_URL is not set".to_string()))?;
        let service_key = std::env::var("STORAGE_SERVICE_KEY")
            .map_err(|_| BlobError::Transport("STORAGE_SERVICE_KEY is not set".to_string()))?;
        let bucket = std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "bundles".to_string());
        Ok(Self::new(api_url, bucket, service_key))
    }
}

#[cfg(feature = "remote")]
#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), BlobError> {
        let url = format!("{}/object/{}/{}", self.api_url, self.bucket, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header("cache-control", format!("max-age={cache_control}"))
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BlobError::Upload {
                path: path.to_string(),
                message: format!("status {status}: {message}"),
            });
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.api_url, self.bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_overwrites() {
        let store = InMemoryBlobStore::new();
        store
            .upload("g/latest.js", b"v1".to_vec(), "application/javascript", "0")
            .await
            .unwrap();
        store
            .upload("g/latest.js", b"v2".to_vec(), "application/javascript", "0")
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("g/latest.js").unwrap().bytes, b"v2");
    }

    #[tokio::test]
    async fn test_public_url_layout() {
        let store = InMemoryBlobStore::new();
        assert_eq!(store.public_url("g/latest.js"), "memory://bundles/g/latest.js");
    }
}
