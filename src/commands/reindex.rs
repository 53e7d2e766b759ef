//! Reindex command: rebuild both indexes from the database

use super::Pipeline;
use crate::error::Result;
use serde::Serialize;
use tracing::{info, warn};

/// Reindex statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexStats {
    pub documents: usize,
    pub chunks_indexed: usize,
}

/// Push every stored chunk back into the vector and keyword indexes,
/// embedding chunks that have no vector for the configured model yet.
///
/// `recreate` drops the Qdrant collection first, which is needed after the
/// embedding dimension changes.
pub async fn cmd_reindex(pipeline: &Pipeline, recreate: bool) -> Result<ReindexStats> {
    let documents = pipeline.db.global_stats().await?.document_count;
    info!("Reindexing {} documents", documents);

    if let Some(store) = &pipeline.qdrant {
        if recreate && store.delete_collection().await? {
            warn!("Dropped collection {}", store.collection());
        }
        store.ensure_collection().await?;
    }

    let chunks_indexed = pipeline.ingestor().restore_indexes().await?;
    Ok(ReindexStats {
        documents,
        chunks_indexed,
    })
}

pub fn print_reindex_stats(stats: &ReindexStats) {
    println!("✓ Reindex complete");
    println!("  Documents: {}", stats.documents);
    println!("  Chunks indexed: {}", stats.chunks_indexed);
}
