//! Document ingestion and deletion
//!
//! Ingestion runs text → chunks → embeddings → metadata database → both
//! indexes. The database transaction decides idempotence: identical content
//! for the same owner is reported as [`IngestOutcome::Conflict`]. When
//! indexing fails, everything written for the document is removed again
//! before the error is returned.

use crate::chunk::{chunk_with_config, compute_text_hash};
use crate::config::{ChunkConfig, Config, EmbeddingFailurePolicy};
use crate::embed::{Embedder, ResilientEmbedder};
use crate::error::{Error, Result};
use crate::keyword::KeywordIndex;
use crate::meta::{ChunkRecord, DocumentRecord, EmbeddingRecord, InsertOutcome, MetaDb};
use crate::models::{
    ChunkMetadata, DocumentMetadata, IndexEntry, IndexFilter, IngestOutcome, IngestRequest,
};
use crate::retry::CallPolicy;
use crate::store::{VectorIndex, VectorPoint};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Writes documents to the metadata database and both indexes
pub struct Ingestor {
    db: MetaDb,
    embedder: ResilientEmbedder,
    vectors: Arc<dyn VectorIndex>,
    keywords: Arc<dyn KeywordIndex>,
    chunk: ChunkConfig,
    index_policy: CallPolicy,
}

impl Ingestor {
    pub fn new(
        db: MetaDb,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        keywords: Arc<dyn KeywordIndex>,
    ) -> Self {
        let config = Config::default();
        Self {
            db,
            embedder: ResilientEmbedder::new(
                embedder,
                config.calls.embedding_policy(),
                config.embedding.failure_policy,
            )
            .with_batching(config.embedding.batch_size, config.embedding.concurrency),
            vectors,
            keywords,
            chunk: config.chunk,
            index_policy: config.calls.index_policy(),
        }
    }

    /// Take chunking, batching, failure policy and call policies from `config`
    pub fn with_config(mut self, config: &Config) -> Self {
        self.embedder = ResilientEmbedder::new(
            self.embedder.inner().clone(),
            config.calls.embedding_policy(),
            config.embedding.failure_policy,
        )
        .with_batching(config.embedding.batch_size, config.embedding.concurrency);
        self.chunk = config.chunk.clone();
        self.index_policy = config.calls.index_policy();
        self
    }

    pub fn with_chunking(mut self, chunk: ChunkConfig) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: EmbeddingFailurePolicy) -> Self {
        self.embedder = self.embedder.with_failure_policy(failure_policy);
        self
    }

    /// Use the same policy for the embedder and both indexes
    pub fn with_call_policy(mut self, policy: CallPolicy) -> Self {
        self.embedder = self.embedder.with_policy(policy);
        self.index_policy = policy;
        self
    }

    pub fn db(&self) -> &MetaDb {
        &self.db
    }

    /// Ingest one document
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        if request.owner_id.trim().is_empty() {
            return Err(Error::Validation("owner_id is required".to_string()));
        }
        if request.text.trim().is_empty() {
            return Err(Error::Validation("text is empty".to_string()));
        }

        let content_hash = compute_text_hash(&request.text);
        if let Some(existing) = self
            .db
            .find_document_by_hash(&request.owner_id, &content_hash)
            .await
            .map_err(Error::into_index_unavailable)?
        {
            debug!("Document {} already holds this content", existing.id);
            return Ok(conflict(existing));
        }

        let chunks = chunk_with_config(&request.text, &self.chunk)?;
        let doc = DocumentRecord::new(
            &request.owner_id,
            &request.text,
            content_hash,
            &request.metadata,
        )?;
        let chunk_records: Vec<ChunkRecord> =
            chunks.iter().map(|c| ChunkRecord::new(&doc, c)).collect();

        let embedded = self
            .embedder
            .embed_chunks(chunks.iter().map(|c| c.text.clone()).collect())
            .await?;

        let model = self.embedder.model_name().to_string();
        let embedding_records: Vec<EmbeddingRecord> = chunk_records
            .iter()
            .zip(embedded.vectors.iter().zip(&embedded.degraded))
            .map(|(chunk, (vector, degraded))| {
                EmbeddingRecord::new(&chunk.id, &model, vector, *degraded)
            })
            .collect();

        match self
            .db
            .insert_document(&doc, &chunk_records, &embedding_records)
            .await
            .map_err(Error::into_index_unavailable)?
        {
            InsertOutcome::Inserted => {}
            InsertOutcome::Duplicate(existing) => return Ok(conflict(existing)),
        }

        let entries: Vec<IndexEntry> = chunk_records
            .iter()
            .zip(&embedded.degraded)
            .map(|(record, degraded)| index_entry(&doc, &request.metadata, record, *degraded))
            .collect();

        if let Err(e) = self.index_entries(entries, embedded.vectors).await {
            warn!("Indexing document {} failed, rolling back: {}", doc.id, e);
            self.remove_everywhere(&doc).await;
            return Err(e.into_index_unavailable());
        }

        let degraded_chunks = embedded.degraded.iter().filter(|d| **d).count();
        info!(
            "Ingested document {} for {} ({} chunks, {} degraded)",
            doc.id,
            doc.owner_id,
            chunks.len(),
            degraded_chunks
        );

        Ok(IngestOutcome::Created {
            document_id: doc.id,
            chunk_count: chunks.len(),
            degraded_chunks,
        })
    }

    /// Rebuild both indexes from the database. Chunks without a stored
    /// vector for the active model are embedded again. Returns the number
    /// of chunks indexed.
    pub async fn restore_indexes(&self) -> Result<usize> {
        let model = self.embedder.model_name().to_string();
        let dimension = self.embedder.dimension();
        let documents = self
            .db
            .list_all_documents()
            .await
            .map_err(Error::into_index_unavailable)?;

        let mut total = 0;
        for doc in documents {
            let chunks = self
                .db
                .get_chunks(&doc.id)
                .await
                .map_err(Error::into_index_unavailable)?;
            if chunks.is_empty() {
                continue;
            }

            let mut stored: HashMap<String, EmbeddingRecord> = self
                .db
                .get_embeddings(&doc.id, &model)
                .await
                .map_err(Error::into_index_unavailable)?
                .into_iter()
                .filter(|e| e.dimension as usize == dimension)
                .map(|e| (e.chunk_id.clone(), e))
                .collect();

            let missing: Vec<&ChunkRecord> =
                chunks.iter().filter(|c| !stored.contains_key(&c.id)).collect();
            if !missing.is_empty() {
                debug!(
                    "Embedding {} chunks of {} missing a {} vector",
                    missing.len(),
                    doc.id,
                    model
                );
                let embedded = self
                    .embedder
                    .embed_chunks(missing.iter().map(|c| c.text.clone()).collect())
                    .await?;
                let records: Vec<EmbeddingRecord> = missing
                    .iter()
                    .zip(embedded.vectors.iter().zip(&embedded.degraded))
                    .map(|(chunk, (vector, degraded))| {
                        EmbeddingRecord::new(&chunk.id, &model, vector, *degraded)
                    })
                    .collect();
                self.db
                    .upsert_embeddings(&records)
                    .await
                    .map_err(Error::into_index_unavailable)?;
                stored.extend(records.into_iter().map(|e| (e.chunk_id.clone(), e)));
            }

            let metadata = doc.metadata();
            let mut entries = Vec::with_capacity(chunks.len());
            let mut vectors = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                if let Some(embedding) = stored.get(&chunk.id) {
                    entries.push(index_entry(&doc, &metadata, chunk, embedding.degraded));
                    vectors.push(embedding.values());
                }
            }

            total += entries.len();
            self.index_entries(entries, vectors)
                .await
                .map_err(Error::into_index_unavailable)?;
        }

        info!("Restored {} chunks into both indexes", total);
        Ok(total)
    }

    async fn index_entries(&self, entries: Vec<IndexEntry>, vectors: Vec<Vec<f32>>) -> Result<()> {
        let points: Vec<VectorPoint> = entries
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(entry, vector)| VectorPoint::new(entry, vector))
            .collect();

        let (vector_result, keyword_result) = tokio::join!(
            self.index_policy
                .call("vector upsert", || self.vectors.upsert(points.clone())),
            self.index_policy
                .call("keyword index", || self.keywords.index(entries.clone())),
        );
        vector_result?;
        keyword_result?;
        Ok(())
    }

    /// Best-effort removal used to undo a failed ingestion
    async fn remove_everywhere(&self, doc: &DocumentRecord) {
        let filter = IndexFilter::document(&doc.owner_id, &doc.id);
        if let Err(e) = self.vectors.delete(&filter).await {
            warn!("Could not remove vectors of {}: {}", doc.id, e);
        }
        if let Err(e) = self.keywords.delete(&filter).await {
            warn!("Could not remove keyword entries of {}: {}", doc.id, e);
        }
        if let Err(e) = self.db.delete_document(&doc.id).await {
            warn!("Could not remove document {}: {}", doc.id, e);
        }
    }

    /// Delete a document owned by `owner_id` from the database and both
    /// indexes. Documents of other owners are reported as not found.
    pub async fn delete(&self, document_id: &str, owner_id: &str) -> Result<()> {
        if owner_id.trim().is_empty() {
            return Err(Error::Validation("owner_id is required".to_string()));
        }

        let doc = self
            .db
            .get_document(document_id)
            .await
            .map_err(Error::into_index_unavailable)?
            .filter(|d| d.owner_id == owner_id)
            .ok_or_else(|| Error::NotFound(format!("document {}", document_id)))?;

        let filter = IndexFilter::document(owner_id, document_id);
        self.index_policy
            .call("vector delete", || self.vectors.delete(&filter))
            .await
            .map_err(Error::into_index_unavailable)?;
        self.index_policy
            .call("keyword delete", || self.keywords.delete(&filter))
            .await
            .map_err(Error::into_index_unavailable)?;

        self.db
            .delete_document(&doc.id)
            .await
            .map_err(Error::into_index_unavailable)?;

        info!("Deleted document {} for {}", doc.id, owner_id);
        Ok(())
    }
}

fn index_entry(
    doc: &DocumentRecord,
    metadata: &DocumentMetadata,
    chunk: &ChunkRecord,
    degraded: bool,
) -> IndexEntry {
    IndexEntry {
        chunk_id: chunk.id.clone(),
        text: chunk.text.clone(),
        metadata: ChunkMetadata {
            owner_id: doc.owner_id.clone(),
            document_id: doc.id.clone(),
            chunk_index: chunk.chunk_index as u32,
            start_offset: chunk.start_offset as usize,
            end_offset: chunk.end_offset as usize,
            title: metadata.title.clone(),
            category: metadata.category.clone(),
            tags: metadata.tags.clone(),
            created_at: doc.created(),
            degraded,
        },
    }
}

fn conflict(existing: DocumentRecord) -> IngestOutcome {
    IngestOutcome::Conflict {
        chunk_count: existing.chunk_count as usize,
        document_id: existing.id,
    }
}
