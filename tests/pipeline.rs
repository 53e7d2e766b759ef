//! End-to-end ingestion and search through the public API

use async_trait::async_trait;
use recall::chunk::chunk_text;
use recall::config::ChunkConfig;
use recall::embed::{normalize_embedding, Embedder};
use recall::error::{Error, Result};
use recall::ingest::Ingestor;
use recall::keyword::SqliteKeywordIndex;
use recall::meta::MetaDb;
use recall::models::{
    IndexFilter, IngestRequest, ScoredChunk, SearchRequest, SearchStatus, SearchType,
};
use recall::retry::CallPolicy;
use recall::search::SearchCoordinator;
use recall::store::{MemoryVectorIndex, VectorIndex, VectorPoint};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DIM: usize = 64;
const TEXT: &str =
    "Alice met Bob today. They discussed the Q3 roadmap in detail over two paragraphs.";

/// Bag-of-words vectors: texts sharing words point the same way
struct WordEmbedder;

#[async_trait]
impl Embedder for WordEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIM];
                for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                    let hash = blake3::hash(word.to_lowercase().as_bytes());
                    v[hash.as_bytes()[0] as usize % DIM] += 1.0;
                }
                normalize_embedding(&v)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "word-buckets"
    }
}

struct DownVectorIndex;

#[async_trait]
impl VectorIndex for DownVectorIndex {
    async fn upsert(&self, _points: Vec<VectorPoint>) -> Result<()> {
        Err(Error::Qdrant("connection refused".to_string()))
    }

    async fn query(&self, _v: Vec<f32>, _f: &IndexFilter, _k: usize) -> Result<Vec<ScoredChunk>> {
        Err(Error::Qdrant("connection refused".to_string()))
    }

    async fn delete(&self, _filter: &IndexFilter) -> Result<()> {
        Err(Error::Qdrant("connection refused".to_string()))
    }

    async fn count(&self, _filter: &IndexFilter) -> Result<usize> {
        Err(Error::Qdrant("connection refused".to_string()))
    }
}

struct Setup {
    db: MetaDb,
    vectors: Arc<MemoryVectorIndex>,
    keywords: Arc<SqliteKeywordIndex>,
    _tmp: TempDir,
}

async fn setup() -> Setup {
    let tmp = TempDir::new().unwrap();
    let db = MetaDb::new(&tmp.path().join("recall.db")).await.unwrap();
    let keywords = Arc::new(SqliteKeywordIndex::new(db.pool().clone()).await.unwrap());
    Setup {
        db,
        vectors: Arc::new(MemoryVectorIndex::new(DIM)),
        keywords,
        _tmp: tmp,
    }
}

fn policy() -> CallPolicy {
    CallPolicy::new(Duration::from_secs(5), 1, Duration::from_millis(1))
}

impl Setup {
    fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            self.db.clone(),
            Arc::new(WordEmbedder),
            self.vectors.clone(),
            self.keywords.clone(),
        )
        .with_chunking(ChunkConfig {
            chunk_size: 50,
            overlap: 10,
        })
        .with_call_policy(policy())
    }

    fn coordinator(&self, vectors: Arc<dyn VectorIndex>) -> SearchCoordinator {
        SearchCoordinator::new(Arc::new(WordEmbedder), vectors, self.keywords.clone())
            .with_call_policy(policy())
            .with_audit(self.db.clone())
    }
}

#[test]
fn alice_text_splits_near_the_sentence_boundary() {
    let chunks = chunk_text(TEXT, 50, 10).unwrap();
    assert!(chunks.len() >= 2);
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 50));
    assert!((35..=45).contains(&chunks[1].start_offset));
}

#[tokio::test]
async fn hybrid_query_finds_the_roadmap() {
    let s = setup().await;
    let ingestor = s.ingestor();
    ingestor.ingest(IngestRequest::new(TEXT, "alice")).await.unwrap();
    ingestor
        .ingest(IngestRequest::new("Bob also keeps a Q3 roadmap of his own.", "bob"))
        .await
        .unwrap();

    let outcome = s
        .coordinator(s.vectors.clone())
        .search(
            SearchRequest::new("Q3 roadmap", "alice")
                .with_type(SearchType::Hybrid)
                .with_limit(5),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, SearchStatus::Complete);
    assert!(!outcome.partial);
    assert!(!outcome.hits.is_empty() && outcome.hits.len() <= 5);
    assert!(outcome.hits[0].text.contains("roadmap"));
    assert!(outcome.hits.iter().all(|h| h.metadata.owner_id == "alice"));

    let mut ids: Vec<_> = outcome.hits.iter().map(|h| h.chunk_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), outcome.hits.len());

    let history = s.db.list_search_queries("alice", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].search_type, "hybrid");
}

#[tokio::test]
async fn vector_outage_degrades_to_keyword_results() {
    let s = setup().await;
    s.ingestor().ingest(IngestRequest::new(TEXT, "alice")).await.unwrap();

    let outcome = s
        .coordinator(Arc::new(DownVectorIndex))
        .search(SearchRequest::new("Q3 roadmap", "alice").with_limit(5))
        .await
        .unwrap();

    assert_eq!(outcome.status, SearchStatus::Partial);
    assert!(outcome.partial);
    assert!(!outcome.hits.is_empty());
    assert_eq!(outcome.degradations.len(), 1);
}

#[tokio::test]
async fn reingest_and_delete_round() {
    let s = setup().await;
    let ingestor = s.ingestor();

    let first = ingestor.ingest(IngestRequest::new(TEXT, "alice")).await.unwrap();
    let second = ingestor.ingest(IngestRequest::new(TEXT, "alice")).await.unwrap();
    assert!(second.is_conflict());
    assert_eq!(first.document_id(), second.document_id());

    assert!(matches!(
        ingestor.delete(first.document_id(), "bob").await,
        Err(Error::NotFound(_))
    ));
    ingestor.delete(first.document_id(), "alice").await.unwrap();

    let outcome = s
        .coordinator(s.vectors.clone())
        .search(SearchRequest::new("Q3 roadmap", "alice"))
        .await
        .unwrap();
    assert!(outcome.hits.is_empty());
    assert_eq!(outcome.status, SearchStatus::Complete);
}
