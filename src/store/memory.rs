//! In-process vector index with exact cosine search

use super::{VectorIndex, VectorPoint};
use crate::error::{Error, Result};
use crate::models::{IndexFilter, ScoredChunk};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Brute-force index used for `vector.backend = "memory"` and in tests
pub struct MemoryVectorIndex {
    dimension: usize,
    points: RwLock<HashMap<String, VectorPoint>>,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }
}

/// Cosine similarity clamped to `0..=1`; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::IndexUnavailable(format!(
                "Vector dimension mismatch: expected {} (got {})",
                self.dimension,
                mismatch.vector.len()
            )));
        }

        let mut guard = self.points.write().await;
        for point in points {
            guard.insert(point.chunk_id.clone(), point);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        filter: &IndexFilter,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        filter.validate()?;
        if vector.len() != self.dimension {
            return Err(Error::Validation(format!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            )));
        }

        let guard = self.points.read().await;
        let mut scored: Vec<ScoredChunk> = guard
            .values()
            .filter(|p| !p.payload.metadata.degraded && filter.matches(&p.payload.metadata))
            .map(|p| {
                let similarity = cosine_similarity(&vector, &p.vector);
                p.payload.clone().into_scored(p.chunk_id.clone(), similarity)
            })
            .collect();
        drop(guard);

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);

        debug!("Memory index returned {} chunks", scored.len());
        Ok(scored)
    }

    async fn delete(&self, filter: &IndexFilter) -> Result<()> {
        filter.validate()?;
        self.points
            .write()
            .await
            .retain(|_, p| !filter.matches(&p.payload.metadata));
        Ok(())
    }

    async fn count(&self, filter: &IndexFilter) -> Result<usize> {
        filter.validate()?;
        Ok(self
            .points
            .read()
            .await
            .values()
            .filter(|p| filter.matches(&p.payload.metadata))
            .count())
    }
}
