//! Metadata storage using SQLite
//!
//! This module handles all durable state outside the vector store:
//! - Documents (raw text, content hash, typed metadata)
//! - Chunks (positioned slices of a document)
//! - Embeddings (one active vector per chunk per model)
//! - Search queries (append-only audit log)

mod schema;

pub use schema::*;

use crate::chunk::TextChunk;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{DocumentMetadata, SearchOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

const UPSERT_EMBEDDING_SQL: &str = r#"
INSERT INTO embeddings (chunk_id, model_name, dimension, vector, degraded, created_at)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT(chunk_id, model_name) DO UPDATE SET
    dimension = excluded.dimension,
    vector = excluded.vector,
    degraded = excluded.degraded,
    created_at = excluded.created_at
"#;

/// Stable point id for chunk `index` of `document_id`
pub fn chunk_point_id(document_id: &str, index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", document_id, index).as_bytes(),
    )
    .to_string()
}

/// Parse an RFC 3339 column, falling back to the epoch for unreadable rows
pub fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// A stored document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub owner_id: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub raw_text: String,
    pub content_hash: String,
    pub metadata_json: String,
    pub chunk_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentRecord {
    pub fn new(
        owner_id: &str,
        raw_text: &str,
        content_hash: String,
        metadata: &DocumentMetadata,
    ) -> Result<Self> {
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: metadata.title.clone(),
            category: metadata.category.clone(),
            raw_text: raw_text.to_string(),
            content_hash,
            metadata_json: serde_json::to_string(metadata)?,
            chunk_count: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn metadata(&self) -> DocumentMetadata {
        serde_json::from_str(&self.metadata_json).unwrap_or_default()
    }

    pub fn created(&self) -> DateTime<Utc> {
        parse_timestamp(&self.created_at)
    }
}

/// A stored chunk
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub boundary: String,
    pub chunk_hash: String,
    pub created_at: String,
}

impl ChunkRecord {
    pub fn new(document: &DocumentRecord, chunk: &TextChunk) -> Self {
        Self {
            id: chunk_point_id(&document.id, chunk.index),
            document_id: document.id.clone(),
            chunk_index: chunk.index as i64,
            text: chunk.text.clone(),
            start_offset: chunk.start_offset as i64,
            end_offset: chunk.end_offset as i64,
            boundary: chunk.boundary.to_string(),
            chunk_hash: chunk.hash.clone(),
            created_at: document.created_at.clone(),
        }
    }
}

/// A stored embedding
#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub model_name: String,
    pub dimension: i64,
    pub vector: Vec<u8>,
    pub degraded: bool,
    pub created_at: String,
}

impl EmbeddingRecord {
    pub fn new(chunk_id: &str, model_name: &str, vector: &[f32], degraded: bool) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            model_name: model_name.to_string(),
            dimension: vector.len() as i64,
            vector: encode_vector(vector),
            degraded,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn values(&self) -> Vec<f32> {
        decode_vector(&self.vector)
    }
}

/// Little-endian f32 encoding
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// A search audit row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SearchQueryRecord {
    pub id: String,
    pub owner_id: String,
    pub query_text: String,
    pub search_type: String,
    pub status: String,
    pub result_count: i64,
    pub execution_time_ms: i64,
    pub created_at: String,
}

impl SearchQueryRecord {
    pub fn from_outcome(owner_id: &str, outcome: &SearchOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            query_text: outcome.query.clone(),
            search_type: outcome.search_type.to_string(),
            status: outcome.status.to_string(),
            result_count: outcome.hits.len() as i64,
            execution_time_ms: outcome.elapsed_ms as i64,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Result of inserting a document
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted,
    /// Same content already stored for this owner
    Duplicate(DocumentRecord),
}

/// Statistics for a single owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub degraded_chunk_count: usize,
    pub search_count: usize,
    pub categories: Vec<(String, usize)>,
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub owner_count: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub search_count: usize,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Open (and if needed create) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Shared pool, also used by the keyword index
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='documents'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Document Operations =====

    /// Insert a document with its chunks and embeddings in one transaction.
    ///
    /// A concurrent or earlier insert of the same `(owner_id, content_hash)`
    /// is reported as [`InsertOutcome::Duplicate`] and nothing is written.
    pub async fn insert_document(
        &self,
        doc: &DocumentRecord,
        chunks: &[ChunkRecord],
        embeddings: &[EmbeddingRecord],
    ) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, title, category, raw_text, content_hash, metadata_json, chunk_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.title)
        .bind(&doc.category)
        .bind(&doc.raw_text)
        .bind(&doc.content_hash)
        .bind(&doc.metadata_json)
        .bind(chunks.len() as i64)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                drop(tx);
                debug!(
                    "Document with hash {} already exists for {}",
                    doc.content_hash, doc.owner_id
                );
                return match self
                    .find_document_by_hash(&doc.owner_id, &doc.content_hash)
                    .await?
                {
                    Some(existing) => Ok(InsertOutcome::Duplicate(existing)),
                    None => Err(Error::Database(e)),
                };
            }
            return Err(Error::Database(e));
        }

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, start_offset, end_offset, boundary, chunk_hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(&chunk.boundary)
            .bind(&chunk.chunk_hash)
            .bind(&chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for embedding in embeddings {
            sqlx::query(UPSERT_EMBEDDING_SQL)
                .bind(&embedding.chunk_id)
                .bind(&embedding.model_name)
                .bind(embedding.dimension)
                .bind(&embedding.vector)
                .bind(embedding.degraded)
                .bind(&embedding.created_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }

    /// Get document by ID
    pub async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// Get an owner's document by content hash
    pub async fn find_document_by_hash(
        &self,
        owner_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE owner_id = ? AND content_hash = ?",
        )
        .bind(owner_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// List an owner's documents, newest first
    pub async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentRecord>> {
        let docs = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE owner_id = ? ORDER BY created_at DESC, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Every document of every owner, oldest first
    pub async fn list_all_documents(&self) -> Result<Vec<DocumentRecord>> {
        let docs = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Delete a document, its chunks and their embeddings.
    /// Returns whether a document was removed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ===== Chunk Operations =====

    /// Get chunks for a document
    pub async fn get_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Get embeddings of a document's chunks for one model, in chunk order
    pub async fn get_embeddings(
        &self,
        document_id: &str,
        model_name: &str,
    ) -> Result<Vec<EmbeddingRecord>> {
        let embeddings = sqlx::query_as::<_, EmbeddingRecord>(
            r#"
            SELECT e.* FROM embeddings e
            JOIN chunks c ON e.chunk_id = c.id
            WHERE c.document_id = ? AND e.model_name = ?
            ORDER BY c.chunk_index
            "#,
        )
        .bind(document_id)
        .bind(model_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(embeddings)
    }

    /// Insert or replace embeddings
    pub async fn upsert_embeddings(&self, embeddings: &[EmbeddingRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for embedding in embeddings {
            sqlx::query(UPSERT_EMBEDDING_SQL)
                .bind(&embedding.chunk_id)
                .bind(&embedding.model_name)
                .bind(embedding.dimension)
                .bind(&embedding.vector)
                .bind(embedding.degraded)
                .bind(&embedding.created_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ===== Search Query Operations =====

    /// Append a search audit row
    pub async fn record_search_query(&self, record: &SearchQueryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_queries (id, owner_id, query_text, search_type, status, result_count, execution_time_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(&record.query_text)
        .bind(&record.search_type)
        .bind(&record.status)
        .bind(record.result_count)
        .bind(record.execution_time_ms)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent searches of an owner
    pub async fn list_search_queries(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchQueryRecord>> {
        let rows = sqlx::query_as::<_, SearchQueryRecord>(
            "SELECT * FROM search_queries WHERE owner_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ===== Statistics =====

    /// Get statistics for one owner
    pub async fn owner_stats(&self, owner_id: &str) -> Result<OwnerStats> {
        let doc_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        let chunk_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chunks c
            JOIN documents d ON c.document_id = d.id
            WHERE d.owner_id = ?
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        let degraded_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT e.chunk_id) FROM embeddings e
            JOIN chunks c ON e.chunk_id = c.id
            JOIN documents d ON c.document_id = d.id
            WHERE d.owner_id = ? AND e.degraded = 1
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        let search_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM search_queries WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?;

        let categories: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT COALESCE(category, 'uncategorized'), COUNT(*) FROM documents
            WHERE owner_id = ?
            GROUP BY 1
            ORDER BY 2 DESC, 1
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OwnerStats {
            document_count: doc_count as usize,
            chunk_count: chunk_count as usize,
            degraded_chunk_count: degraded_count as usize,
            search_count: search_count as usize,
            categories: categories
                .into_iter()
                .map(|(name, count)| (name, count as usize))
                .collect(),
        })
    }

    /// Get global statistics
    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let owner_count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT owner_id) FROM documents")
            .fetch_one(&self.pool)
            .await?;

        let doc_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        let search_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_queries")
            .fetch_one(&self.pool)
            .await?;

        Ok(GlobalStats {
            owner_count: owner_count as usize,
            document_count: doc_count as usize,
            chunk_count: chunk_count as usize,
            search_count: search_count as usize,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
