//! Vector index
//!
//! This module defines the [`VectorIndex`] seam and its implementations:
//! - [`QdrantStore`]: collection management, filtered upsert/delete/search
//! - [`MemoryVectorIndex`]: exact in-process search
//!
//! Every query is pre-filtered by owner (and optionally document/category)
//! before distance ranking, and points flagged `degraded` never take part
//! in similarity search.

mod memory;
mod payload;

pub use memory::*;
pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{IndexFilter, ScoredChunk};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct,
    ScalarQuantizationBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Nearest-neighbour index over chunk vectors
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace points; visible to the next query once this returns
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Top `k` chunks passing `filter`, by cosine similarity (clamped to 0..=1)
    async fn query(&self, vector: Vec<f32>, filter: &IndexFilter, k: usize)
        -> Result<Vec<ScoredChunk>>;

    /// Remove every point passing `filter`
    async fn delete(&self, filter: &IndexFilter) -> Result<()>;

    /// Number of points passing `filter`
    async fn count(&self, filter: &IndexFilter) -> Result<usize>;
}

/// Information about a Qdrant collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
    ensured: OnceCell<()>,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.vector.qdrant_url,
            config.qdrant_api_key(),
            &config.vector.collection_name,
            config.embedding.dimension,
        )
    }

    /// Create a new store connection directly with URL and collection name
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        dimension: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
            ensured: OnceCell::new(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ensure the collection exists with correct configuration
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        for field in ["owner_id", "document_id", "category"] {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field,
                    FieldType::Keyword,
                ))
                .await?;
        }
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                "degraded",
                FieldType::Bool,
            ))
            .await?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn ensure_once(&self) -> Result<()> {
        self.ensured
            .get_or_try_init(|| self.ensure_collection())
            .await
            .map(|_| ())
    }

    /// Delete the collection if it exists
    pub async fn delete_collection(&self) -> Result<bool> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(false);
        }

        info!("Deleting collection {}", self.collection);
        self.client.delete_collection(&self.collection).await?;
        Ok(true)
    }

    /// Get collection info (point count, etc)
    pub async fn get_collection_info(&self) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(&self.collection).await?;
        Ok(info.result.map(|result| CollectionInfo {
            points_count: result.points_count.unwrap_or(0),
            indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
            status: format!("{:?}", result.status()),
        }))
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {} (got {})",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        self.ensure_once().await?;

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs = points
            .into_iter()
            .map(VectorPoint::to_point_struct)
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs).wait(true))
            .await?;

        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        filter: &IndexFilter,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        filter.validate()?;
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching collection {} with limit {}", self.collection, k);

        let search = SearchPointsBuilder::new(&self.collection, vector, k as u64)
            .with_payload(true)
            .filter(search_filter(filter));

        let response = self.client.search_points(search).await?;

        response
            .result
            .into_iter()
            .map(|p| {
                let payload = ChunkPayload::from_qdrant_payload(p.payload)?;
                Ok(payload.into_scored(point_id_to_string(p.id), p.score.clamp(0.0, 1.0)))
            })
            .collect()
    }

    async fn delete(&self, filter: &IndexFilter) -> Result<()> {
        filter.validate()?;
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(());
        }

        debug!("Deleting points from {} for {:?}", self.collection, filter);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(owner_filter(filter))
                    .wait(true),
            )
            .await?;

        Ok(())
    }

    async fn count(&self, filter: &IndexFilter) -> Result<usize> {
        filter.validate()?;
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(owner_filter(filter))
                    .exact(true),
            )
            .await?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

/// Owner/document/category conditions shared by every operation
fn owner_filter(filter: &IndexFilter) -> Filter {
    let mut must_conditions = vec![Condition::matches("owner_id", filter.owner_id.clone())];

    match filter.document_ids.as_slice() {
        [] => {}
        [single] => must_conditions.push(Condition::matches("document_id", single.clone())),
        many => must_conditions.push(Condition::matches("document_id", many.to_vec())),
    }

    if let Some(ref category) = filter.category {
        must_conditions.push(Condition::matches("category", category.clone()));
    }

    Filter {
        must: must_conditions,
        should: vec![],
        must_not: vec![],
        min_should: None,
    }
}

/// Owner filter that also keeps placeholder vectors out of similarity search
fn search_filter(filter: &IndexFilter) -> Filter {
    let mut f = owner_filter(filter);
    f.must_not.push(Condition::matches("degraded", true));
    f
}

/// Convert PointId to string
fn point_id_to_string(id: Option<PointId>) -> String {
    match id {
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)),
        }) => uuid,
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)),
        }) => num.to_string(),
        _ => String::new(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use chrono::Utc;

    #[test]
    fn test_owner_filter_conditions() {
        let filter = IndexFilter {
            owner_id: "alice".to_string(),
            document_ids: vec!["d1".to_string(), "d2".to_string()],
            category: Some("notes".to_string()),
        };

        let qdrant_filter = owner_filter(&filter);
        assert_eq!(qdrant_filter.must.len(), 3);
        assert!(qdrant_filter.must_not.is_empty());

        let owner_only = owner_filter(&IndexFilter::owner("alice"));
        assert_eq!(owner_only.must.len(), 1);
    }

    #[test]
    fn test_search_filter_excludes_degraded() {
        let f = search_filter(&IndexFilter::owner("alice"));
        assert_eq!(f.must.len(), 1);
        assert_eq!(f.must_not.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let store = QdrantStore::new("http://127.0.0.1:6334", None, "test_collection", 3)
            .expect("store should initialize");

        let point = VectorPoint {
            chunk_id: uuid::Uuid::new_v4().to_string(),
            vector: vec![0.1, 0.2],
            payload: ChunkPayload {
                text: "text".to_string(),
                metadata: ChunkMetadata {
                    owner_id: "alice".to_string(),
                    document_id: "doc".to_string(),
                    chunk_index: 0,
                    start_offset: 0,
                    end_offset: 4,
                    title: None,
                    category: None,
                    tags: Vec::new(),
                    created_at: Utc::now(),
                    degraded: false,
                },
            },
        };

        let err = store
            .upsert(vec![point])
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::Qdrant(message) => assert!(message.contains("Vector dimension mismatch")),
            other => panic!("expected qdrant error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_requires_owner() {
        let store = QdrantStore::new("http://127.0.0.1:6334", None, "test_collection", 3).unwrap();
        let err = store
            .query(vec![0.0; 3], &IndexFilter::owner(""), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
