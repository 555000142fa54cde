//! Rebuild trigger transport.
//!
//! Atom mutations and rollbacks request a rebuild of the owning game as a
//! side effect. Delivery is best-effort: the trigger surface is infallible,
//! implementations return quickly and detach any real work, and failures are
//! logged, never surfaced to the caller.

use async_trait::async_trait;

use crate::types::GameId;

/// Contract for the asynchronous rebuild trigger.
#[async_trait]
pub trait RebuildTrigger: Send + Sync {
    /// Request a rebuild of `game_id`. Best-effort: must return quickly,
    /// never error, and tolerate missing configuration by skipping with a
    /// warning.
    async fn request_rebuild(&self, game_id: GameId);
}

/// No-op trigger for tests and embedded use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRebuildTrigger;

#[async_trait]
impl RebuildTrigger for NullRebuildTrigger {
    async fn request_rebuild(&self, _game_id: GameId) {}
}

/// HTTP rebuild trigger.
///
/// Posts `{"game_id": "..."}` to the configured endpoint from a detached
/// task, so callers never wait on delivery.
///
/// ## Configuration
///
/// - `REBUILD_URL`: rebuild endpoint; unset means skip with a warning
/// - `REBUILD_SERVICE_KEY`: optional bearer token
#[cfg(feature = "remote")]
pub struct HttpRebuildTrigger {
    http: reqwest::Client,
    endpoint: Option<String>,
    service_key: Option<String>,
}

#[cfg(feature = "remote")]
impl HttpRebuildTrigger {
    /// Create a trigger with an explicit endpoint.
    pub fn new(endpoint: impl Into<String>, service_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: Some(endpoint.into()),
            service_key,
        }
    }

    /// Create a trigger from environment variables. An unset `REBUILD_URL`
    /// yields a trigger that skips every request with a warning.
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: std::env::var("REBUILD_URL").ok().filter(|s| !s.is_empty()),
            service_key: std::env::var("REBUILD_SERVICE_KEY").ok().filter(|s| !s.is_empty()),
        }
    }
}

#[cfg(feature = "remote")]
#[async_trait]
impl RebuildTrigger for HttpRebuildTrigger {
    async fn request_rebuild(&self, game_id: GameId) {
        let Some(endpoint) = self.endpoint.clone() else {
            tracing::warn!(game_id = %game_id, "rebuild trigger: REBUILD_URL not set, skipping");
            return;
        };

        let mut request = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({ "game_id": game_id }));
        if let Some(key) = &self.service_key {
            request = request.bearer_auth(key);
        }

        tokio::spawn(async move {
            match request.send().await {
                Ok(response) => {
                    tracing::info!(
                        game_id = %game_id,
                        status = response.status().as_u16(),
                        "rebuild trigger: response"
                    );
                }
                Err(err) => {
                    tracing::error!(game_id = %game_id, error = %err, "rebuild trigger: failed");
                }
            }
        });
    }
}
