//! Status, per-owner statistics and search history

use super::Pipeline;
use crate::config::VectorBackend;
use crate::error::{Error, Result};
use crate::keyword::KeywordIndex;
use crate::meta::{GlobalStats, MetaDb, OwnerStats, SearchQueryRecord};
use crate::models::IndexFilter;
use crate::store::CollectionInfo;
use serde::Serialize;
use tracing::{debug, info};

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub vector_backend: VectorBackend,
    pub qdrant_url: Option<String>,
    pub collection_name: Option<String>,
    pub qdrant_connected: bool,
    pub collection: Option<CollectionInfo>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub augment_enabled: bool,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(pipeline: &Pipeline) -> Result<StatusInfo> {
    info!("Getting status");
    let config = &pipeline.config;
    let db_stats = pipeline.db.global_stats().await?;

    let (qdrant_connected, collection) = match &pipeline.qdrant {
        Some(store) => match store.get_collection_info().await {
            Ok(info) => (true, info),
            Err(e) => {
                debug!("Qdrant connection error: {:?}", e);
                (false, None)
            }
        },
        None => (false, None),
    };

    let uses_qdrant = config.vector.backend == VectorBackend::Qdrant;
    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        vector_backend: config.vector.backend,
        qdrant_url: uses_qdrant.then(|| config.vector.qdrant_url.clone()),
        collection_name: uses_qdrant.then(|| config.vector.collection_name.clone()),
        qdrant_connected,
        collection,
        embedding_model: config.embedding.model.clone(),
        embedding_dimension: config.embedding.dimension,
        augment_enabled: config.augment.enabled,
        db_stats,
    })
}

/// Statistics for one owner, with what each index holds for them
#[derive(Debug, Clone, Serialize)]
pub struct OwnerReport {
    pub owner_id: String,
    pub stats: OwnerStats,
    /// None when the index could not be reached
    pub vector_points: Option<usize>,
    pub keyword_entries: Option<usize>,
}

pub async fn cmd_owner_stats(pipeline: &Pipeline, owner_id: &str) -> Result<OwnerReport> {
    if owner_id.trim().is_empty() {
        return Err(Error::Validation("owner_id is required".to_string()));
    }

    let stats = pipeline.db.owner_stats(owner_id).await?;
    let filter = IndexFilter::owner(owner_id);
    let vector_points = pipeline.vectors.count(&filter).await.ok();
    let keyword_entries = pipeline.keywords.count(&filter).await.ok();

    Ok(OwnerReport {
        owner_id: owner_id.to_string(),
        stats,
        vector_points,
        keyword_entries,
    })
}

/// Most recent searches of an owner
pub async fn cmd_history(
    db: &MetaDb,
    owner_id: &str,
    limit: usize,
) -> Result<Vec<SearchQueryRecord>> {
    if owner_id.trim().is_empty() {
        return Err(Error::Validation("owner_id is required".to_string()));
    }
    db.list_search_queries(owner_id, limit).await
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 recall Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);

    match status.vector_backend {
        VectorBackend::Qdrant => {
            println!("\nQdrant:");
            if let Some(url) = &status.qdrant_url {
                println!("  URL: {}", url);
            }
            if let Some(name) = &status.collection_name {
                println!("  Collection: {}", name);
            }
            let connection_status = match (status.qdrant_connected, &status.collection) {
                (true, Some(_)) => "✓ Connected",
                (true, None) => "⚠ Connected (collection is created on first ingest)",
                (false, _) => "✗ Not connected",
            };
            println!("  Status: {}", connection_status);
            if let Some(info) = &status.collection {
                println!("  Points: {} ({})", info.points_count, info.status);
            }
        }
        VectorBackend::Memory => {
            println!("\nVector index: in memory, rebuilt from the database");
        }
    }

    println!(
        "\nEmbedding Model: {} ({} dimensions)",
        status.embedding_model, status.embedding_dimension
    );
    println!(
        "Augmentation: {}",
        if status.augment_enabled { "enabled" } else { "disabled" }
    );
    println!("\nDatabase Stats:");
    println!("  Owners: {}", status.db_stats.owner_count);
    println!("  Documents: {}", status.db_stats.document_count);
    println!("  Chunks: {}", status.db_stats.chunk_count);
    println!("  Searches: {}", status.db_stats.search_count);
}

pub fn print_owner_report(report: &OwnerReport) {
    let stats = &report.stats;
    println!("\n📈 Statistics for {}\n", report.owner_id);
    println!("  Documents: {}", stats.document_count);
    println!("  Chunks: {}", stats.chunk_count);
    if stats.degraded_chunk_count > 0 {
        println!("  Chunks without a real embedding: {}", stats.degraded_chunk_count);
    }
    println!("  Searches: {}", stats.search_count);

    let count = |n: Option<usize>| n.map_or("unreachable".to_string(), |n| n.to_string());
    println!("  Vector index entries: {}", count(report.vector_points));
    println!("  Keyword index entries: {}", count(report.keyword_entries));

    if !stats.categories.is_empty() {
        println!("\n  Categories:");
        for (category, n) in &stats.categories {
            println!("    {}: {}", category, n);
        }
    }
}

pub fn print_history(owner_id: &str, queries: &[SearchQueryRecord]) {
    println!("\n🕘 Recent searches of {}\n", owner_id);
    if queries.is_empty() {
        println!("No searches recorded.");
        return;
    }

    for q in queries {
        println!(
            "{}  [{} / {}] {} results in {}ms  {}",
            q.created_at, q.search_type, q.status, q.result_count, q.execution_time_ms, q.query_text
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_history_requires_owner_and_lists_searches() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();

        assert!(matches!(
            cmd_history(&db, "  ", 10).await,
            Err(Error::Validation(_))
        ));

        db.record_search_query(&SearchQueryRecord {
            id: "q1".to_string(),
            owner_id: "alice".to_string(),
            query_text: "roadmap".to_string(),
            search_type: "hybrid".to_string(),
            status: "complete".to_string(),
            result_count: 2,
            execution_time_ms: 12,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        })
        .await
        .unwrap();

        let history = cmd_history(&db, "alice", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query_text, "roadmap");
        assert!(cmd_history(&db, "bob", 10).await.unwrap().is_empty());
    }
}
