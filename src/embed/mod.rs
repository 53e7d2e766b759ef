//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - An OpenAI-compatible HTTP backend and an optional local fastembed backend
//! - Ordered, concurrent batch processing
//! - The strict/placeholder failure policy used during ingestion

#[cfg(feature = "local-embed")]
mod fastembed_impl;
mod http_backend;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;
pub use http_backend::*;

use crate::config::{EmbeddingConfig, EmbeddingFailurePolicy, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::retry::CallPolicy;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts; output order matches input order
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(Error::Embedding(format!(
                "Expected 1 embedding, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig, timeout: Duration) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::new(config, timeout)?)),
        #[cfg(feature = "local-embed")]
        EmbeddingProvider::Local => Ok(Arc::new(FastEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embed"))]
        EmbeddingProvider::Local => Err(Error::Config(
            "embedding.provider = \"local\" requires building with --features local-embed"
                .to_string(),
        )),
    }
}

pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Deterministic unit vector derived from the text hash.
///
/// Stands in for a real embedding under the placeholder policy; it carries
/// no semantic information and is always stored with `degraded = true`.
pub fn placeholder_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    let mut reader = hasher.finalize_xof();

    let mut bytes = vec![0u8; dimension * 4];
    reader.fill(&mut bytes);

    let raw: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| {
            let v = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            (v as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
        })
        .collect();

    normalize_embedding(&raw)
}

/// Helper to embed in batches, keeping input order.
///
/// Up to `concurrency` batches are in flight at once.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
    concurrency: usize,
) -> Result<Vec<Vec<f32>>> {
    let batches: Vec<Vec<String>> = texts
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect();

    let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
        .map(|batch| embed_checked(embedder, batch))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(embedded.into_iter().flatten().collect())
}

/// Embed one batch and check the provider returned one vector per text
async fn embed_checked(embedder: &dyn Embedder, batch: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let expected = batch.len();
    let vectors = embedder.embed_batch(batch).await?;
    if vectors.len() != expected {
        return Err(Error::Embedding(format!(
            "Provider returned {} embeddings for {} inputs",
            vectors.len(),
            expected
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dimension()) {
        return Err(Error::Embedding(format!(
            "Embedding dimension mismatch for model '{}': expected {}, got {}",
            embedder.model_name(),
            embedder.dimension(),
            bad.len()
        )));
    }
    Ok(vectors)
}

/// Vectors for a document's chunks, in chunk order
#[derive(Debug, Clone, Default)]
pub struct EmbeddedChunks {
    pub vectors: Vec<Vec<f32>>,
    /// `true` where the vector is a placeholder
    pub degraded: Vec<bool>,
}

impl EmbeddedChunks {
    pub fn degraded_count(&self) -> usize {
        self.degraded.iter().filter(|d| **d).count()
    }
}

/// Embedder wrapped with timeouts, retries and the configured failure policy
#[derive(Clone)]
pub struct ResilientEmbedder {
    inner: Arc<dyn Embedder>,
    policy: CallPolicy,
    failure_policy: EmbeddingFailurePolicy,
    batch_size: usize,
    concurrency: usize,
}

impl ResilientEmbedder {
    pub fn new(
        inner: Arc<dyn Embedder>,
        policy: CallPolicy,
        failure_policy: EmbeddingFailurePolicy,
    ) -> Self {
        Self {
            inner,
            policy,
            failure_policy,
            batch_size: 32,
            concurrency: 1,
        }
    }

    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: EmbeddingFailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn inner(&self) -> &Arc<dyn Embedder> {
        &self.inner
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    pub fn failure_policy(&self) -> EmbeddingFailurePolicy {
        self.failure_policy
    }

    /// Embed chunk texts for ingestion.
    ///
    /// Under [`EmbeddingFailurePolicy::Strict`] any batch that still fails
    /// after retries fails the whole call with `ProviderUnavailable`. Under
    /// [`EmbeddingFailurePolicy::Placeholder`] that batch gets placeholder
    /// vectors and is flagged degraded.
    pub async fn embed_chunks(&self, texts: Vec<String>) -> Result<EmbeddedChunks> {
        let batches: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        debug!(
            "Embedding {} chunks in {} batches with {}",
            texts.len(),
            batches.len(),
            self.inner.model_name()
        );

        let results: Vec<(Vec<Vec<f32>>, bool)> = stream::iter(batches)
            .map(|batch| self.embed_batch_with_policy(batch))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut out = EmbeddedChunks::default();
        for (vectors, degraded) in results {
            out.degraded.extend(std::iter::repeat(degraded).take(vectors.len()));
            out.vectors.extend(vectors);
        }
        Ok(out)
    }

    async fn embed_batch_with_policy(&self, batch: Vec<String>) -> Result<(Vec<Vec<f32>>, bool)> {
        let inner = self.inner.as_ref();
        let attempt = self
            .policy
            .call("embedding batch", || embed_checked(inner, batch.clone()))
            .await;

        match attempt {
            Ok(vectors) => Ok((vectors, false)),
            Err(e) => match self.failure_policy {
                EmbeddingFailurePolicy::Strict => Err(e.into_provider_unavailable()),
                EmbeddingFailurePolicy::Placeholder => {
                    warn!(
                        "Embedding provider unavailable ({}); storing {} placeholder vectors",
                        e,
                        batch.len()
                    );
                    let dimension = self.inner.dimension();
                    let vectors = batch
                        .iter()
                        .map(|text| placeholder_vector(text, dimension))
                        .collect();
                    Ok((vectors, true))
                }
            },
        }
    }

    /// Embed a search query. Never falls back to a placeholder.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let inner = self.inner.as_ref();
        self.policy
            .call("query embedding", || async move {
                let mut vectors = embed_checked(inner, vec![text.to_string()]).await?;
                Ok(vectors.remove(0))
            })
            .await
            .map_err(Error::into_provider_unavailable)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic embedders for tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bag-of-words embedder: each lowercase word is hashed into a bucket
    pub struct HashingEmbedder {
        pub dimension: usize,
    }

    impl HashingEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self { dimension }
        }

        pub fn vector_for(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; self.dimension];
            for word in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let hash = blake3::hash(word.to_lowercase().as_bytes());
                let bucket = u64::from_le_bytes(
                    hash.as_bytes()[..8].try_into().unwrap(),
                ) as usize
                    % self.dimension;
                v[bucket] += 1.0;
            }
            normalize_embedding(&v)
        }
    }

    #[async_trait]
    impl Embedder for HashingEmbedder {
        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "test-hashing"
        }
    }

    /// Always fails, counting calls
    #[derive(Default)]
    pub struct FailingEmbedder {
        pub calls: AtomicUsize,
    }

    impl FailingEmbedder {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Embedding("provider is down".to_string()))
        }

        fn dimension(&self) -> usize {
            16
        }

        fn model_name(&self) -> &str {
            "test-failing"
        }
    }
}
