//! Document listing and deletion

use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::meta::{DocumentRecord, MetaDb};
use crate::models::DocumentMetadata;
use serde::Serialize;
use tracing::info;

/// A stored document without its text
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub chunk_count: usize,
    pub content_hash: String,
    pub metadata: DocumentMetadata,
    pub created_at: String,
}

impl From<DocumentRecord> for DocumentSummary {
    fn from(doc: DocumentRecord) -> Self {
        Self {
            metadata: doc.metadata(),
            id: doc.id,
            title: doc.title,
            category: doc.category,
            chunk_count: doc.chunk_count as usize,
            content_hash: doc.content_hash,
            created_at: doc.created_at,
        }
    }
}

/// List an owner's documents, newest first
pub async fn cmd_list_documents(db: &MetaDb, owner_id: &str) -> Result<Vec<DocumentSummary>> {
    if owner_id.trim().is_empty() {
        return Err(Error::Validation("owner_id is required".to_string()));
    }
    info!("Listing documents of {}", owner_id);

    let docs = db.list_documents(owner_id).await?;
    Ok(docs.into_iter().map(DocumentSummary::from).collect())
}

/// Delete one of the owner's documents from every store
pub async fn cmd_delete_document(
    ingestor: &Ingestor,
    document_id: &str,
    owner_id: &str,
) -> Result<()> {
    ingestor.delete(document_id, owner_id).await
}

/// Print documents list to console
pub fn print_documents(owner_id: &str, docs: &[DocumentSummary]) {
    println!("\n📚 Documents of {}\n", owner_id);

    if docs.is_empty() {
        println!("No documents stored. Use 'recall ingest' to add some.");
        return;
    }

    for doc in docs {
        println!("• {}", doc.title.as_deref().unwrap_or("(untitled)"));
        println!("  ID: {}", doc.id);
        if let Some(category) = &doc.category {
            println!("  Category: {}", category);
        }
        if !doc.metadata.tags.is_empty() {
            println!("  Tags: {}", doc.metadata.tags.join(", "));
        }
        if let Some(source) = &doc.metadata.source {
            println!("  Source: {}", source);
        }
        println!("  Chunks: {}", doc.chunk_count);
        println!("  Created: {}", doc.created_at);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::HashingEmbedder;
    use crate::keyword::SqliteKeywordIndex;
    use crate::models::IngestRequest;
    use crate::store::MemoryVectorIndex;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_and_delete() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        let keywords = SqliteKeywordIndex::new(db.pool().clone()).await.unwrap();
        let ingestor = Ingestor::new(
            db.clone(),
            Arc::new(HashingEmbedder::new(16)),
            Arc::new(MemoryVectorIndex::new(16)),
            Arc::new(keywords),
        );

        let metadata = DocumentMetadata {
            title: Some("Standup".to_string()),
            tags: vec!["roadmap".to_string()],
            ..Default::default()
        };
        let outcome = ingestor
            .ingest(IngestRequest::new("Alice met Bob today.", "alice").with_metadata(metadata))
            .await
            .unwrap();

        let docs = cmd_list_documents(&db, "alice").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title.as_deref(), Some("Standup"));
        assert_eq!(docs[0].metadata.tags, vec!["roadmap"]);
        assert!(cmd_list_documents(&db, "bob").await.unwrap().is_empty());

        let err = cmd_delete_document(&ingestor, outcome.document_id(), "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        cmd_delete_document(&ingestor, outcome.document_id(), "alice")
            .await
            .unwrap();
        assert!(cmd_list_documents(&db, "alice").await.unwrap().is_empty());
    }
}
