//! Embedding service collaborator.
//!
//! Atoms carry a fixed-length vector derived from their name, signature,
//! description, and code; the vector feeds nearest-neighbor search. The
//! service behind [`EmbeddingClient`] is external: an OpenAI-compatible
//! embeddings endpoint in production, a deterministic hasher in tests.

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::types::Port;

/// Dimensionality of atom embeddings.
pub const EMBEDDING_DIM: usize = 1536;

/// Maximum characters submitted to the embedding service; longer inputs are
/// truncated to stay within model limits.
pub const MAX_EMBED_INPUT_CHARS: usize = 30_000;

/// Contract for the external embedding service.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed `text` into a fixed-length vector.
    ///
    /// Implementations truncate input to [`MAX_EMBED_INPUT_CHARS`] before
    /// submission.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Derive the embedding text for an atom: `name(in) => out: description`
/// followed by the code body on a new line.
pub fn embedding_text(
    name: &str,
    inputs: &[Port],
    outputs: &[Port],
    description: Option<&str>,
    code: &str,
) -> String {
    let sig: Vec<String> = inputs.iter().map(|p| format!("{}:{}", p.name, p.ty)).collect();
    let out: Vec<String> = outputs.iter().map(|p| format!("{}:{}", p.name, p.ty)).collect();
    format!(
        "{}({}) => {}: {}\n{}",
        name,
        sig.join(", "),
        out.join(", "),
        description.unwrap_or(""),
        code
    )
}

/// Truncate embedding input to the submission bound, on a char boundary.
pub fn truncate_input(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_INPUT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Cosine similarity between two vectors, 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Deterministic in-process embedder for tests and offline use.
///
/// Hashes input bytes into a small fixed vector; identical text embeds to an
/// identical vector (similarity 1.0), so exact-text search is exercisable
/// without the external service.
#[derive(Debug, Clone, Default)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of the default test width.
    pub fn new() -> Self {
        Self { dim: 64 }
    }

    /// Create an embedder producing vectors of `dim` components.
    pub fn with_dim(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = truncate_input(text);
        let mut vector = vec![0.0f32; self.dim];
        // FNV-style rolling hash scattered across the vector.
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for (i, byte) in text.bytes().enumerate() {
            state ^= byte as u64;
            state = state.wrapping_mul(0x0000_0100_0000_01b3);
            let slot = (state as usize) % self.dim;
            vector[slot] += ((state >> 32) as f32 / u32::MAX as f32) - 0.5;
            // Mix position so permuted text embeds differently.
            state = state.rotate_left((i % 63) as u32 + 1);
        }
        Ok(vector)
    }
}

/// OpenAI-compatible HTTP embedding client.
///
/// ## Configuration
///
/// - `EMBEDDINGS_API_URL`: endpoint (default: OpenRouter embeddings URL)
/// - `EMBEDDINGS_API_KEY`: bearer token (required at request time)
/// - `EMBEDDINGS_MODEL`: model identifier (default: openai/text-embedding-3-small)
#[cfg(feature = "remote")]
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

#[cfg(feature = "remote")]
impl HttpEmbeddingClient {
    /// Default embeddings endpoint.
    pub const DEFAULT_API_URL: &'static str = "https://openrouter.ai/api/v1/embeddings";
    /// Default embedding model.
    pub const DEFAULT_MODEL: &'static str = "openai/text-embedding-3-small";

    /// Create a client with explicit settings.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: Some(api_key.into()),
            model: model.into(),
        }
    }

    /// Create a client from environment variables.
    ///
    /// A missing `EMBEDDINGS_API_KEY` is reported as a `Config` error on the
    /// first embed call rather than at construction.
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: std::env::var("EMBEDDINGS_API_URL")
                .unwrap_or_else(|_| Self::DEFAULT_API_URL.to_string()),
            api_key: std::env::var("EMBEDDINGS_API_KEY").ok().filter(|s| !s.is_empty()),
            model: std::env::var("EMBEDDINGS_MODEL")
                .unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string()),
        }
    }
}

#[cfg(feature = "remote")]
#[derive(serde::Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[cfg(feature = "remote")]
#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[cfg(feature = "remote")]
#[derive(serde::Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[cfg(feature = "remote")]
#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EmbeddingError::Config("EMBEDDINGS_API_KEY is not set".to_string())
        })?;

        let truncated = truncate_input(text);
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                input: truncated,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;
        let datum = body.data.into_iter().next().ok_or_else(|| {
            EmbeddingError::Transport("embedding response carried no data".to_string())
        })?;
        Ok(datum.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_text_shape() {
        let inputs = vec![Port::new("value", "number"), Port::new("max", "number")];
        let outputs = vec![Port::new("clamped", "number")];
        let text = embedding_text(
            "math_clamp",
            &inputs,
            &outputs,
            Some("Clamp a value"),
            "function math_clamp(v, max) { return v; }",
        );
        assert!(text.starts_with("math_clamp(value:number, max:number) => clamped:number: Clamp a value\n"));
        assert!(text.ends_with("function math_clamp(v, max) { return v; }"));
    }

    #[test]
    fn test_truncation_bound() {
        let long = "x".repeat(MAX_EMBED_INPUT_CHARS + 500);
        assert_eq!(truncate_input(&long).chars().count(), MAX_EMBED_INPUT_CHARS);
        assert_eq!(truncate_input("short"), "short");
    }

    #[tokio::test]
    async fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("player_jump code").await.unwrap();
        let b = embedder.embed("player_jump code").await.unwrap();
        let c = embedder.embed("something else").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
