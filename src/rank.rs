//! Candidate merging and composite scoring
//!
//! Candidates from both indexes are merged by chunk id (the higher raw
//! similarity wins), scored as
//!
//! ```text
//! similarity_weight * similarity
//!   + min(length_weight, chars / length_saturation_chars)   if chars > min_informative_chars
//!   + recency_weight * (1 - age / recency_window)           if age < recency_window
//!   + tag_weight                                            if a tag or the category occurs in the query
//! ```
//!
//! and ordered by score, then recall (semantic first), then creation time.

use crate::config::RankingConfig;
use crate::models::{Recall, ScoredChunk, SearchHit};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A merged candidate and the index that surfaced it
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk: ScoredChunk,
    pub recall: Recall,
}

/// Deduplicate by chunk id, keeping the higher similarity.
/// Equal similarities keep the semantic copy.
pub fn merge_candidates(semantic: Vec<ScoredChunk>, keyword: Vec<ScoredChunk>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::with_capacity(semantic.len() + keyword.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    let tagged = semantic
        .into_iter()
        .map(|c| (c, Recall::Semantic))
        .chain(keyword.into_iter().map(|c| (c, Recall::Keyword)));

    for (chunk, recall) in tagged {
        match positions.get(&chunk.chunk_id) {
            Some(&pos) => {
                if chunk.similarity > merged[pos].chunk.similarity {
                    merged[pos] = Candidate { chunk, recall };
                }
            }
            None => {
                positions.insert(chunk.chunk_id.clone(), merged.len());
                merged.push(Candidate { chunk, recall });
            }
        }
    }

    merged
}

/// Composite score of one candidate
pub fn composite_score(
    chunk: &ScoredChunk,
    query_lower: &str,
    config: &RankingConfig,
    now: DateTime<Utc>,
) -> f32 {
    let similarity = chunk.similarity.clamp(0.0, 1.0);
    let mut score = config.similarity_weight * similarity;

    let chars = chunk.text.chars().count();
    if chars > config.min_informative_chars {
        let ratio = chars as f32 / config.length_saturation_chars as f32;
        score += ratio.min(config.length_weight);
    }

    score += recency_bonus(chunk.metadata.created_at, config, now);

    if mentions_label(&chunk.metadata.category, &chunk.metadata.tags, query_lower) {
        score += config.tag_weight;
    }

    score
}

/// Linear decay from `recency_weight` (now) to zero (window age)
fn recency_bonus(created_at: DateTime<Utc>, config: &RankingConfig, now: DateTime<Utc>) -> f32 {
    let window_secs = f64::from(config.recency_window_days) * 86_400.0;
    let age_secs = (now - created_at).num_seconds().max(0) as f64;
    if age_secs >= window_secs {
        return 0.0;
    }
    config.recency_weight * (1.0 - age_secs / window_secs) as f32
}

fn mentions_label(category: &Option<String>, tags: &[String], query_lower: &str) -> bool {
    category
        .iter()
        .chain(tags.iter())
        .map(|label| label.trim().to_lowercase())
        .any(|label| !label.is_empty() && query_lower.contains(&label))
}

/// Score, order and truncate merged candidates
pub fn rank(
    candidates: Vec<Candidate>,
    query: &str,
    config: &RankingConfig,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<SearchHit> {
    let query_lower = query.to_lowercase();

    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|c| SearchHit {
            score: composite_score(&c.chunk, &query_lower, config, now),
            similarity: c.chunk.similarity,
            recall: c.recall,
            chunk_id: c.chunk.chunk_id,
            text: c.chunk.text,
            metadata: c.chunk.metadata,
        })
        .collect();

    hits.sort_by(compare_hits);
    hits.truncate(limit);
    hits
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.recall.cmp(&b.recall))
        .then_with(|| a.metadata.created_at.cmp(&b.metadata.created_at))
        .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn scored(id: &str, text: &str, similarity: f32, age_days: i64) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            text: text.to_string(),
            similarity,
            metadata: ChunkMetadata {
                owner_id: "alice".to_string(),
                document_id: "doc".to_string(),
                chunk_index: 0,
                start_offset: 0,
                end_offset: text.chars().count(),
                title: None,
                category: None,
                tags: Vec::new(),
                created_at: now() - Duration::days(age_days),
                degraded: false,
            },
        }
    }

    #[test]
    fn test_merge_keeps_higher_similarity() {
        let merged = merge_candidates(
            vec![scored("a", "x", 0.3, 100), scored("b", "y", 0.9, 100)],
            vec![scored("a", "x", 0.8, 100), scored("c", "z", 0.5, 100)],
        );

        assert_eq!(merged.len(), 3);
        let a = merged.iter().find(|c| c.chunk.chunk_id == "a").unwrap();
        assert_eq!(a.chunk.similarity, 0.8);
        assert_eq!(a.recall, Recall::Keyword);
    }

    #[test]
    fn test_merge_tie_keeps_semantic() {
        let merged = merge_candidates(
            vec![scored("a", "x", 0.5, 100)],
            vec![scored("a", "x", 0.5, 100)],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].recall, Recall::Semantic);
    }

    #[test]
    fn test_composite_score_defaults() {
        let config = RankingConfig::default();
        let long_text = "x".repeat(150);

        // old, short: similarity only
        let s = composite_score(&scored("a", "short", 1.0, 100), "", &config, now());
        assert!((s - 0.4).abs() < 1e-6);

        // old, 150 chars: + min(0.2, 0.15)
        let s = composite_score(&scored("a", &long_text, 1.0, 100), "", &config, now());
        assert!((s - 0.55).abs() < 1e-6);

        // fresh: + full recency
        let s = composite_score(&scored("a", "short", 0.0, 0), "", &config, now());
        assert!((s - 0.1).abs() < 1e-6);

        // half window: half recency
        let s = composite_score(&scored("a", "short", 0.0, 15), "", &config, now());
        assert!((s - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_tag_and_category_bonus() {
        let config = RankingConfig::default();
        let mut chunk = scored("a", "short", 0.0, 100);
        chunk.metadata.tags = vec!["Roadmap".to_string()];
        let s = composite_score(&chunk, "q3 roadmap", &config, now());
        assert!((s - 0.1).abs() < 1e-6);

        chunk.metadata.tags.clear();
        chunk.metadata.category = Some("meetings".to_string());
        assert!((composite_score(&chunk, "q3 roadmap", &config, now())).abs() < 1e-6);
        assert!((composite_score(&chunk, "all meetings", &config, now()) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let config = RankingConfig::default();
        let candidates = merge_candidates(
            vec![scored("a", "x", 0.9, 100), scored("b", "y", 0.2, 100)],
            vec![scored("c", "z", 0.5, 100)],
        );

        let hits = rank(candidates, "query", &config, now(), 2);
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_rank_ties_semantic_then_older() {
        let config = RankingConfig::default();
        let candidates = merge_candidates(
            vec![scored("s-new", "x", 0.5, 40)],
            vec![scored("k-old", "y", 0.5, 50), scored("k-new", "z", 0.5, 45)],
        );

        let hits = rank(candidates, "query", &config, now(), 10);
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["s-new", "k-old", "k-new"]);
    }
}
