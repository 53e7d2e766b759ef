//! Hybrid search
//!
//! [`SearchCoordinator`] queries the vector and keyword indexes
//! concurrently, merges and ranks their candidates, optionally asks the
//! augmenter for an insight and appends an audit row. Collaborator failures
//! never surface as errors: they downgrade the outcome to `Partial` or
//! `Unavailable` and are listed in [`SearchOutcome::degradations`].

use crate::augment::ResultAugmenter;
use crate::config::{Config, KeywordConfig, RankingConfig, SearchConfig};
use crate::embed::{Embedder, ResilientEmbedder};
use crate::error::{Error, Result};
use crate::keyword::{extract_terms, KeywordIndex};
use crate::meta::{MetaDb, SearchQueryRecord};
use crate::models::{
    Degradation, DegradationReason, IndexFilter, Insight, Recall, ScoredChunk, SearchHit,
    SearchOutcome, SearchRequest, SearchStatus, SearchType,
};
use crate::rank::{merge_candidates, rank};
use crate::retry::CallPolicy;
use crate::store::VectorIndex;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

type LegResult = std::result::Result<Vec<ScoredChunk>, Degradation>;

/// Orchestrates one search across both indexes
pub struct SearchCoordinator {
    embedder: ResilientEmbedder,
    vectors: Arc<dyn VectorIndex>,
    keywords: Arc<dyn KeywordIndex>,
    augmenter: Option<Arc<dyn ResultAugmenter>>,
    audit: Option<MetaDb>,
    ranking: RankingConfig,
    keyword: KeywordConfig,
    search: SearchConfig,
    index_policy: CallPolicy,
    augment_policy: CallPolicy,
}

impl SearchCoordinator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorIndex>,
        keywords: Arc<dyn KeywordIndex>,
    ) -> Self {
        let config = Config::default();
        Self {
            embedder: ResilientEmbedder::new(
                embedder,
                config.calls.embedding_policy(),
                config.embedding.failure_policy,
            ),
            vectors,
            keywords,
            augmenter: None,
            audit: None,
            ranking: config.ranking,
            keyword: config.keyword,
            search: config.search,
            index_policy: config.calls.index_policy(),
            augment_policy: config.calls.augment_policy(),
        }
    }

    /// Take ranking weights, limits and call policies from `config`
    pub fn with_config(mut self, config: &Config) -> Self {
        self.embedder = ResilientEmbedder::new(
            self.embedder.inner().clone(),
            config.calls.embedding_policy(),
            config.embedding.failure_policy,
        );
        self.ranking = config.ranking.clone();
        self.keyword = config.keyword.clone();
        self.search = config.search.clone();
        self.index_policy = config.calls.index_policy();
        self.augment_policy = config.calls.augment_policy();
        self
    }

    /// Use the same policy for every collaborator
    pub fn with_call_policy(mut self, policy: CallPolicy) -> Self {
        self.embedder = self.embedder.with_policy(policy);
        self.index_policy = policy;
        self.augment_policy = policy;
        self
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn ResultAugmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    /// Record every search in the audit log
    pub fn with_audit(mut self, db: MetaDb) -> Self {
        self.audit = Some(db);
        self
    }

    /// Run a search to completion
    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome> {
        self.search_until(request, std::future::pending()).await
    }

    /// Run a search, abandoning pending index queries once `cancel` resolves.
    ///
    /// A cancelled search returns the candidates gathered so far with
    /// `cancelled = true` and status `Partial`.
    pub async fn search_until<C>(&self, request: SearchRequest, cancel: C) -> Result<SearchOutcome>
    where
        C: Future<Output = ()>,
    {
        let started = Instant::now();
        validate_request(&request)?;

        let limit = request
            .limit
            .unwrap_or(self.search.default_limit)
            .min(self.search.max_limit);
        let search_type = request.search_type;
        let per_leg = match search_type {
            SearchType::Hybrid => limit.div_ceil(2),
            _ => limit,
        };
        let filter = request.filter();

        debug!(
            "Searching {} for {:?} ({}, {} per index)",
            request.owner_id, request.query, search_type, per_leg
        );

        let semantic_leg = self.semantic_leg(&request.query, &filter, per_leg);
        let keyword_leg = self.keyword_leg(&request.query, &filter, per_leg);
        tokio::pin!(semantic_leg, keyword_leg, cancel);

        let mut semantic: Option<LegResult> = None;
        let mut keyword: Option<LegResult> = None;
        let mut semantic_done = !search_type.uses_semantic();
        let mut keyword_done = !search_type.uses_keyword();
        let mut cancelled = false;

        while !(semantic_done && keyword_done) {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    cancelled = true;
                    break;
                }
                result = &mut semantic_leg, if !semantic_done => {
                    semantic_done = true;
                    semantic = Some(result);
                }
                result = &mut keyword_leg, if !keyword_done => {
                    keyword_done = true;
                    keyword = Some(result);
                }
            }
        }

        let mut degradations = Vec::new();
        let mut answered = 0;
        let mut requested = 0;
        let mut legs: [Vec<ScoredChunk>; 2] = [Vec::new(), Vec::new()];

        for (slot, leg, wanted, result) in [
            (0, Recall::Semantic, search_type.uses_semantic(), semantic),
            (1, Recall::Keyword, search_type.uses_keyword(), keyword),
        ] {
            if !wanted {
                continue;
            }
            requested += 1;
            match result {
                Some(Ok(chunks)) => {
                    answered += 1;
                    legs[slot] = chunks;
                }
                Some(Err(degradation)) => {
                    warn!(
                        "{} search degraded: {}",
                        degradation.leg, degradation.detail
                    );
                    degradations.push(degradation);
                }
                None => degradations.push(Degradation {
                    leg,
                    reason: DegradationReason::Cancelled,
                    detail: "search cancelled before this index answered".to_string(),
                }),
            }
        }

        let status = if cancelled || (answered > 0 && answered < requested) {
            SearchStatus::Partial
        } else if answered == 0 {
            SearchStatus::Unavailable
        } else {
            SearchStatus::Complete
        };

        let [semantic_chunks, keyword_chunks] = legs;
        let hits = if status == SearchStatus::Unavailable {
            Vec::new()
        } else {
            let candidates = merge_candidates(semantic_chunks, keyword_chunks);
            rank(candidates, &request.query, &self.ranking, Utc::now(), limit)
        };

        let insight = if request.augment && !cancelled && !hits.is_empty() {
            self.augment(&request.query, &hits).await
        } else {
            None
        };

        let outcome = SearchOutcome {
            query: request.query.clone(),
            search_type,
            status,
            partial: status != SearchStatus::Complete,
            cancelled,
            hits,
            degradations,
            insight,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Search for {:?} returned {} hits ({}) in {}ms",
            outcome.query,
            outcome.hits.len(),
            outcome.status,
            outcome.elapsed_ms
        );

        self.record(&request.owner_id, &outcome).await;
        Ok(outcome)
    }

    async fn semantic_leg(&self, query: &str, filter: &IndexFilter, k: usize) -> LegResult {
        let vector = self.embedder.embed_query(query).await.map_err(|e| Degradation {
            leg: Recall::Semantic,
            reason: DegradationReason::ProviderUnavailable,
            detail: e.to_string(),
        })?;

        self.index_policy
            .call("vector query", || self.vectors.query(vector.clone(), filter, k))
            .await
            .map_err(|e| Degradation {
                leg: Recall::Semantic,
                reason: DegradationReason::IndexUnavailable,
                detail: e.into_index_unavailable().to_string(),
            })
    }

    async fn keyword_leg(&self, query: &str, filter: &IndexFilter, k: usize) -> LegResult {
        let terms = extract_terms(query, self.keyword.max_terms);
        if terms.is_empty() {
            debug!("No keyword terms in {:?}", query);
            return Ok(Vec::new());
        }

        self.index_policy
            .call("keyword query", || self.keywords.search(&terms, filter, k))
            .await
            .map_err(|e| Degradation {
                leg: Recall::Keyword,
                reason: DegradationReason::IndexUnavailable,
                detail: e.into_index_unavailable().to_string(),
            })
    }

    async fn augment(&self, query: &str, hits: &[SearchHit]) -> Option<Insight> {
        let augmenter = self.augmenter.as_ref()?;
        match self
            .augment_policy
            .call("augmentation", || augmenter.augment(query, hits))
            .await
        {
            Ok(insight) => Some(insight),
            Err(e) => {
                warn!("Augmentation skipped: {}", e);
                None
            }
        }
    }

    /// Append the audit row under the index call policy. A cancelled
    /// search does not wait for the write.
    async fn record(&self, owner_id: &str, outcome: &SearchOutcome) {
        let Some(db) = self.audit.clone() else {
            return;
        };
        let record = SearchQueryRecord::from_outcome(owner_id, outcome);
        let policy = self.index_policy;
        let write = async move {
            if let Err(e) = policy
                .call("search audit", || db.record_search_query(&record))
                .await
            {
                warn!("Failed to record search query: {}", e);
            }
        };

        if outcome.cancelled {
            tokio::spawn(write);
        } else {
            write.await;
        }
    }
}

fn validate_request(request: &SearchRequest) -> Result<()> {
    if request.query.trim().is_empty() {
        return Err(Error::Validation("query is required".to_string()));
    }
    if request.owner_id.trim().is_empty() {
        return Err(Error::Validation("owner_id is required".to_string()));
    }
    if request.limit == Some(0) {
        return Err(Error::Validation("limit must be > 0".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::{FailingEmbedder, HashingEmbedder};
    use crate::keyword::SqliteKeywordIndex;
    use crate::models::{ChunkMetadata, IndexEntry, SearchScope};
    use crate::store::testing::{FailingVectorIndex, StalledVectorIndex};
    use crate::store::{MemoryVectorIndex, VectorPoint};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::TempDir;

    const DIM: usize = 64;

    struct Fixture {
        embedder: Arc<HashingEmbedder>,
        vectors: Arc<MemoryVectorIndex>,
        keywords: Arc<SqliteKeywordIndex>,
        db: MetaDb,
        _tmp: TempDir,
    }

    async fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        let keywords = SqliteKeywordIndex::new(db.pool().clone()).await.unwrap();
        Fixture {
            embedder: Arc::new(HashingEmbedder::new(DIM)),
            vectors: Arc::new(MemoryVectorIndex::new(DIM)),
            keywords: Arc::new(keywords),
            db,
            _tmp: tmp,
        }
    }

    impl Fixture {
        async fn seed(&self, owner: &str, doc: &str, texts: &[&str]) {
            let entries: Vec<IndexEntry> = texts
                .iter()
                .enumerate()
                .map(|(i, text)| IndexEntry {
                    chunk_id: format!("{owner}-{doc}-{i}"),
                    text: text.to_string(),
                    metadata: ChunkMetadata {
                        owner_id: owner.to_string(),
                        document_id: doc.to_string(),
                        chunk_index: i as u32,
                        start_offset: 0,
                        end_offset: text.chars().count(),
                        title: None,
                        category: None,
                        tags: Vec::new(),
                        created_at: Utc::now(),
                        degraded: false,
                    },
                })
                .collect();
            let points = entries
                .iter()
                .map(|e| VectorPoint::new(e.clone(), self.embedder.vector_for(&e.text)))
                .collect();
            self.vectors.upsert(points).await.unwrap();
            self.keywords.index(entries).await.unwrap();
        }

        fn coordinator(&self) -> SearchCoordinator {
            SearchCoordinator::new(
                self.embedder.clone(),
                self.vectors.clone(),
                self.keywords.clone(),
            )
            .with_call_policy(test_policy())
        }
    }

    fn test_policy() -> CallPolicy {
        CallPolicy::new(Duration::from_secs(5), 0, Duration::from_millis(1))
    }

    struct FailingKeywordIndex;

    #[async_trait]
    impl KeywordIndex for FailingKeywordIndex {
        async fn index(&self, _entries: Vec<IndexEntry>) -> Result<()> {
            Err(Error::Other("database locked".to_string()))
        }
        async fn search(&self, _t: &[String], _f: &IndexFilter, _k: usize) -> Result<Vec<ScoredChunk>> {
            Err(Error::Other("database locked".to_string()))
        }
        async fn delete(&self, _f: &IndexFilter) -> Result<()> {
            Err(Error::Other("database locked".to_string()))
        }
        async fn count(&self, _f: &IndexFilter) -> Result<usize> {
            Err(Error::Other("database locked".to_string()))
        }
    }

    struct FixedAugmenter(Option<Insight>);

    #[async_trait]
    impl ResultAugmenter for FixedAugmenter {
        async fn augment(&self, _query: &str, _hits: &[SearchHit]) -> Result<Insight> {
            self.0
                .clone()
                .ok_or_else(|| Error::Augment("model overloaded".to_string()))
        }
    }

    #[tokio::test]
    async fn test_hybrid_search_complete() {
        let f = fixture().await;
        f.seed(
            "alice",
            "d1",
            &[
                "The Q3 roadmap covers search quality.",
                "Lunch options near the office.",
                "Roadmap review happens every Friday.",
            ],
        )
        .await;

        let outcome = f
            .coordinator()
            .search(SearchRequest::new("Q3 roadmap", "alice").with_limit(5))
            .await
            .unwrap();

        assert_eq!(outcome.status, SearchStatus::Complete);
        assert!(!outcome.partial);
        assert!(!outcome.hits.is_empty());
        assert!(outcome.hits[0].text.to_lowercase().contains("roadmap"));
        assert!(outcome.degradations.is_empty());
    }

    #[tokio::test]
    async fn test_results_are_distinct_and_bounded() {
        let f = fixture().await;
        let texts: Vec<String> = (0..12)
            .map(|i| format!("Roadmap note number {i} about planning"))
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        f.seed("alice", "d1", &refs).await;

        for limit in [1, 3, 4, 7] {
            let outcome = f
                .coordinator()
                .search(SearchRequest::new("roadmap planning", "alice").with_limit(limit))
                .await
                .unwrap();
            assert!(outcome.hits.len() <= limit);
            let ids: HashSet<_> = outcome.hits.iter().map(|h| &h.chunk_id).collect();
            assert_eq!(ids.len(), outcome.hits.len());
            assert!(outcome
                .hits
                .windows(2)
                .all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn test_never_returns_other_owners_chunks() {
        let f = fixture().await;
        f.seed("alice", "d1", &["Alice private roadmap"]).await;
        f.seed("bob", "d2", &["Bob private roadmap", "Bob roadmap again"])
            .await;

        for search_type in [SearchType::Semantic, SearchType::Keyword, SearchType::Hybrid] {
            let outcome = f
                .coordinator()
                .search(SearchRequest::new("private roadmap", "alice").with_type(search_type))
                .await
                .unwrap();
            assert!(!outcome.hits.is_empty());
            assert!(outcome.hits.iter().all(|h| h.metadata.owner_id == "alice"));
        }
    }

    #[tokio::test]
    async fn test_scope_restricts_documents() {
        let f = fixture().await;
        f.seed("alice", "d1", &["roadmap in first document"]).await;
        f.seed("alice", "d2", &["roadmap in second document"]).await;

        let scope = SearchScope {
            document_ids: vec!["d2".to_string()],
            category: None,
        };
        let outcome = f
            .coordinator()
            .search(SearchRequest::new("roadmap", "alice").with_scope(scope))
            .await
            .unwrap();
        assert!(!outcome.hits.is_empty());
        assert!(outcome.hits.iter().all(|h| h.metadata.document_id == "d2"));
    }

    #[tokio::test]
    async fn test_vector_failure_falls_back_to_keywords() {
        let f = fixture().await;
        f.seed("alice", "d1", &["The Q3 roadmap in detail"]).await;

        let coordinator =
            SearchCoordinator::new(f.embedder.clone(), Arc::new(FailingVectorIndex), f.keywords.clone())
                .with_call_policy(test_policy());

        let outcome = coordinator
            .search(SearchRequest::new("Q3 roadmap", "alice"))
            .await
            .unwrap();

        assert_eq!(outcome.status, SearchStatus::Partial);
        assert!(outcome.partial);
        assert_eq!(outcome.hits.len(), 1);
        assert!(outcome.hits.iter().all(|h| h.recall == Recall::Keyword));
        assert_eq!(outcome.degradations.len(), 1);
        assert_eq!(
            outcome.degradations[0].reason,
            DegradationReason::IndexUnavailable
        );
    }

    #[tokio::test]
    async fn test_query_embedding_failure_degrades_semantic_leg() {
        let f = fixture().await;
        f.seed("alice", "d1", &["The Q3 roadmap in detail"]).await;

        let coordinator = SearchCoordinator::new(
            Arc::new(FailingEmbedder::default()),
            f.vectors.clone(),
            f.keywords.clone(),
        )
        .with_call_policy(test_policy());

        let outcome = coordinator
            .search(SearchRequest::new("roadmap", "alice"))
            .await
            .unwrap();

        assert_eq!(outcome.status, SearchStatus::Partial);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(
            outcome.degradations[0].reason,
            DegradationReason::ProviderUnavailable
        );
    }

    #[tokio::test]
    async fn test_both_indexes_failing_is_unavailable() {
        let f = fixture().await;
        let coordinator = SearchCoordinator::new(
            f.embedder.clone(),
            Arc::new(FailingVectorIndex),
            Arc::new(FailingKeywordIndex),
        )
        .with_call_policy(test_policy());

        let outcome = coordinator
            .search(SearchRequest::new("roadmap", "alice"))
            .await
            .unwrap();

        assert_eq!(outcome.status, SearchStatus::Unavailable);
        assert!(outcome.is_unavailable());
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.degradations.len(), 2);
    }

    #[tokio::test]
    async fn test_single_leg_failure_for_restricted_type_is_unavailable() {
        let f = fixture().await;
        let coordinator = SearchCoordinator::new(
            f.embedder.clone(),
            Arc::new(FailingVectorIndex),
            f.keywords.clone(),
        )
        .with_call_policy(test_policy());

        let outcome = coordinator
            .search(SearchRequest::new("roadmap", "alice").with_type(SearchType::Semantic))
            .await
            .unwrap();
        assert_eq!(outcome.status, SearchStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let f = fixture().await;
        let coordinator = f.coordinator();

        for request in [
            SearchRequest::new("   ", "alice"),
            SearchRequest::new("roadmap", ""),
            SearchRequest::new("roadmap", "alice").with_limit(0),
        ] {
            let err = coordinator.search(request).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let f = fixture().await;
        let texts: Vec<String> = (0..80).map(|i| format!("roadmap item {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        f.seed("alice", "d1", &refs).await;

        let outcome = f
            .coordinator()
            .search(SearchRequest::new("roadmap item", "alice").with_limit(500))
            .await
            .unwrap();
        assert!(outcome.hits.len() <= SearchConfig::default().max_limit);
    }

    #[tokio::test]
    async fn test_cancelled_search_returns_promptly() {
        let f = fixture().await;
        f.seed("alice", "d1", &["The Q3 roadmap in detail"]).await;

        let coordinator = SearchCoordinator::new(
            f.embedder.clone(),
            Arc::new(StalledVectorIndex),
            f.keywords.clone(),
        )
        .with_call_policy(CallPolicy::new(Duration::from_secs(60), 0, Duration::from_millis(1)));

        let started = Instant::now();
        let outcome = coordinator
            .search_until(
                SearchRequest::new("roadmap", "alice"),
                tokio::time::sleep(Duration::from_millis(300)),
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(outcome.cancelled);
        assert!(outcome.partial);
        assert_eq!(outcome.status, SearchStatus::Partial);
        assert_eq!(outcome.hits.len(), 1);
        assert!(outcome
            .degradations
            .iter()
            .any(|d| d.reason == DegradationReason::Cancelled && d.leg == Recall::Semantic));
    }

    #[tokio::test]
    async fn test_augmenter_failure_keeps_hits() {
        let f = fixture().await;
        f.seed("alice", "d1", &["The Q3 roadmap in detail"]).await;

        let failing = f
            .coordinator()
            .with_augmenter(Arc::new(FixedAugmenter(None)))
            .search(SearchRequest::new("roadmap", "alice"))
            .await
            .unwrap();
        assert_eq!(failing.status, SearchStatus::Complete);
        assert_eq!(failing.hits.len(), 1);
        assert!(failing.insight.is_none());

        let insight = Insight {
            analysis: Some("Relevant".to_string()),
            ..Default::default()
        };
        let working = f
            .coordinator()
            .with_augmenter(Arc::new(FixedAugmenter(Some(insight.clone()))))
            .search(SearchRequest::new("roadmap", "alice"))
            .await
            .unwrap();
        assert_eq!(working.insight, Some(insight));

        let skipped = f
            .coordinator()
            .with_augmenter(Arc::new(FixedAugmenter(Some(Insight::default()))))
            .search(SearchRequest::new("roadmap", "alice").without_augment())
            .await
            .unwrap();
        assert!(skipped.insight.is_none());
    }

    #[tokio::test]
    async fn test_searches_are_audited() {
        let f = fixture().await;
        f.seed("alice", "d1", &["The Q3 roadmap in detail"]).await;

        let coordinator = f.coordinator().with_audit(f.db.clone());
        coordinator
            .search(SearchRequest::new("roadmap", "alice"))
            .await
            .unwrap();

        let history = f.db.list_search_queries("alice", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query_text, "roadmap");
        assert_eq!(history[0].search_type, "hybrid");
        assert_eq!(history[0].status, "complete");
        assert_eq!(history[0].result_count, 1);
    }

    #[tokio::test]
    async fn test_cancelled_search_is_audited_without_waiting() {
        let f = fixture().await;
        f.seed("alice", "d1", &["The Q3 roadmap in detail"]).await;

        let coordinator = SearchCoordinator::new(
            f.embedder.clone(),
            Arc::new(StalledVectorIndex),
            f.keywords.clone(),
        )
        .with_call_policy(CallPolicy::new(Duration::from_secs(60), 0, Duration::from_millis(1)))
        .with_audit(f.db.clone());

        let outcome = coordinator
            .search_until(
                SearchRequest::new("roadmap", "alice"),
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await
            .unwrap();
        assert!(outcome.cancelled);

        let mut history = Vec::new();
        for _ in 0..50 {
            history = f.db.list_search_queries("alice", 10).await.unwrap();
            if !history.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "partial");
    }
}
