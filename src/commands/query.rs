//! Query command implementation

use crate::error::Result;
use crate::models::{SearchOutcome, SearchRequest, SearchScope, SearchStatus, SearchType};
use crate::search::SearchCoordinator;
use tracing::info;

/// Query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub owner_id: String,
    pub search_type: SearchType,
    /// Number of results; the configured default when unset
    pub limit: Option<usize>,
    /// Restrict to these documents
    pub document_ids: Vec<String>,
    pub category: Option<String>,
    /// Skip generative augmentation
    pub no_augment: bool,
}

/// Execute a query. Ctrl-C abandons pending index queries and returns
/// whatever was gathered.
pub async fn cmd_query(
    coordinator: &SearchCoordinator,
    query: &str,
    options: QueryOptions,
) -> Result<SearchOutcome> {
    info!("Querying: {}", query);

    let mut request = SearchRequest::new(query, options.owner_id)
        .with_type(options.search_type)
        .with_scope(SearchScope {
            document_ids: options.document_ids,
            category: options.category,
        });
    if let Some(limit) = options.limit {
        request = request.with_limit(limit);
    }
    if options.no_augment {
        request = request.without_augment();
    }

    let interrupted = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    coordinator.search_until(request, interrupted).await
}

/// Print query results to console
pub fn print_query_results(outcome: &SearchOutcome) {
    println!("\n🔍 Query: {} ({})\n", outcome.query, outcome.search_type);

    match outcome.status {
        SearchStatus::Complete => {}
        SearchStatus::Partial => {
            if outcome.cancelled {
                println!("⚠ Search interrupted, showing results gathered so far");
            } else {
                println!("⚠ Partial results");
            }
        }
        SearchStatus::Unavailable => {
            println!("✗ Search unavailable");
        }
    }
    for degradation in &outcome.degradations {
        println!("  {} search: {}", degradation.leg, degradation.detail);
    }

    println!(
        "Found {} results in {}ms:\n",
        outcome.hits.len(),
        outcome.elapsed_ms
    );

    for (i, hit) in outcome.hits.iter().enumerate() {
        let meta = &hit.metadata;
        println!(
            "{}. [score: {:.3}, {}] {}",
            i + 1,
            hit.score,
            hit.recall,
            meta.title.as_deref().unwrap_or(&meta.document_id)
        );
        println!(
            "   Document: {} (chunk {}, chars {}..{})",
            meta.document_id, meta.chunk_index, meta.start_offset, meta.end_offset
        );
        if let Some(category) = &meta.category {
            println!("   Category: {}", category);
        }

        let preview: String = hit.text.chars().take(200).collect();
        let ellipsis = if hit.text.chars().count() > 200 { "..." } else { "" };
        println!("   {}{}\n", preview.trim().replace('\n', " "), ellipsis);
    }

    if let Some(insight) = &outcome.insight {
        println!("💡 Insight");
        if let Some(analysis) = &insight.analysis {
            println!("  {}", analysis);
        }
        if let Some(gaps) = &insight.gaps {
            println!("  Gaps: {}", gaps);
        }
        for question in &insight.follow_up_questions {
            println!("  → {}", question);
        }
        if let Some(score) = insight.relevance_score {
            println!("  Relevance: {}", score);
        }
        if let Some(raw) = &insight.raw {
            println!("  {}", raw);
        }
    }
}
