//! Embedding backends: local in-process loader, remote HTTP server, remote
//! cloud API. Each advertises `(name, dimension)` per spec §4.1. The trait
//! shape mirrors the teacher's `LlmProvider` (`skynet-agent/src/provider.rs`)
//! — one async trait, one request/response pair, one typed error.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{EmbeddingError, Result};

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Stable model name this backend serves, used as the cache key prefix
    /// and as the `model_name` tag on every vector it produces.
    fn name(&self) -> &str;

    /// Dimension this backend's model is declared to produce. `embed`
    /// verifies every returned vector against this and raises
    /// `EmbeddingError::Dimension` on mismatch rather than coercing.
    fn dimension(&self) -> usize;

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Validates a raw backend's output against its declared dimension. Every
/// concrete backend below calls this instead of returning vectors directly,
/// so the "mismatches are fatal" invariant in spec §3 lives in one place.
pub(crate) fn check_dimensions(
    model: &str,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>> {
    for v in &vectors {
        if v.len() != expected {
            return Err(EmbeddingError::Dimension {
                model: model.to_string(),
                expected,
                got: v.len(),
            });
        }
    }
    Ok(vectors)
}

/// A deterministic in-process model: a hashing-based embedding suitable
/// for tests and for environments without a real model loader configured.
/// Stands in for "a GGUF loader" per spec §4.1/§4.2 without pulling in a
/// model-format crate the corpus never uses.
pub struct LocalBackend {
    name: String,
    dimension: usize,
}

impl LocalBackend {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};
        let mut vector = vec![0f32; self.dimension];
        let mut seed = text.as_bytes().to_vec();
        for slot in vector.iter_mut() {
            let digest = Sha256::digest(&seed);
            let bytes: [u8; 4] = digest[0..4].try_into().unwrap();
            let as_u32 = u32::from_le_bytes(bytes);
            *slot = (as_u32 as f32 / u32::MAX as f32) * 2.0 - 1.0;
            seed = digest.to_vec();
        }
        vector
    }
}

#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = texts.iter().map(|t| self.embed_one(t)).collect();
        check_dimensions(&self.name, self.dimension, vectors)
    }
}

/// A remote embedding server speaking a simple `{texts: [...]}` ->
/// `{vectors: [[...]]}` JSON protocol, reached over `reqwest` the way the
/// teacher's HTTP-backed providers are (rustls-tls, json feature).
pub struct RemoteHttpBackend {
    name: String,
    dimension: usize,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteHttpBackend {
    pub fn new(name: impl Into<String>, dimension: usize, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension,
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingBackend for RemoteHttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.name,
            texts,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&url).json(&body).send(),
        )
        .await
        .map_err(|_| EmbeddingError::Timeout {
            model: self.name.clone(),
            ms: self.timeout.as_millis() as u64,
        })?
        .map_err(|e| EmbeddingError::Backend {
            model: self.name.clone(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Backend {
                model: self.name.clone(),
                reason: format!("backend returned status {}", response.status()),
            });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| EmbeddingError::Backend {
            model: self.name.clone(),
            reason: format!("invalid response body: {e}"),
        })?;

        check_dimensions(&self.name, self.dimension, parsed.vectors)
    }
}

/// A remote cloud embedding API reached with a bearer token, otherwise
/// identical wire shape to [`RemoteHttpBackend`]. Kept as a distinct type
/// (rather than a flag) because cloud APIs commonly diverge in auth and
/// batching limits from a self-hosted HTTP server.
pub struct RemoteCloudBackend {
    name: String,
    dimension: usize,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteCloudBackend {
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dimension,
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl EmbeddingBackend for RemoteCloudBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.name,
            texts,
        };

        let send = self.client.post(&url).bearer_auth(&self.api_key).json(&body).send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| EmbeddingError::Timeout {
                model: self.name.clone(),
                ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| EmbeddingError::Backend {
                model: self.name.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Backend {
                model: self.name.clone(),
                reason: format!("backend returned status {}", response.status()),
            });
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| EmbeddingError::Backend {
            model: self.name.clone(),
            reason: format!("invalid response body: {e}"),
        })?;

        check_dimensions(&self.name, self.dimension, parsed.vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_backend_is_deterministic_and_dimension_correct() {
        let backend = LocalBackend::new("test-model", 8);
        let a = backend.embed_raw(&["hello".to_string()]).await.unwrap();
        let b = backend.embed_raw(&["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 8);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let backend = LocalBackend::new("test-model", 8);
        let a = backend.embed_raw(&["hello".to_string()]).await.unwrap();
        let b = backend.embed_raw(&["goodbye".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }
}
