//! In-process embeddings through fastembed (ONNX runtime)

use super::{normalize_embedding, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// fastembed model for a configured model name
pub fn local_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "BAAI/bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-large-en-v1.5" => Some(EmbeddingModel::BGELargeENV15),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        _ => None,
    }
}

/// Embedder running a local model on the blocking pool
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedder {
    /// Load the configured model; the first load downloads it
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = local_model(&config.model).ok_or_else(|| {
            Error::Config(format!(
                "embedding.model '{}' has no local build; use provider = \"http\"",
                config.model
            ))
        })?;

        info!("Loading local embedding model {}", config.model);
        let options = InitOptions::new(model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| Error::Embedding(format!("Could not load {}: {}", config.model, e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Embedding {} texts with {}", texts.len(), self.model_name);

        let model = self.model.clone();
        let batch_size = self.batch_size;
        let vectors = tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.embed(texts, Some(batch_size))
        })
        .await
        .map_err(|e| Error::Embedding(format!("Embedding task failed: {}", e)))?
        .map_err(|e| Error::Embedding(e.to_string()))?;

        Ok(vectors.iter().map(|v| normalize_embedding(v)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::embedding_dimension_for_model;

    #[test]
    fn test_local_models_have_known_dimensions() {
        for name in [
            "BAAI/bge-small-en-v1.5",
            "BAAI/bge-base-en-v1.5",
            "BAAI/bge-large-en-v1.5",
            "sentence-transformers/all-MiniLM-L6-v2",
        ] {
            assert!(local_model(name).is_some());
            assert!(embedding_dimension_for_model(name).is_some());
        }
        assert!(local_model("text-embedding-3-small").is_none());
    }
}
