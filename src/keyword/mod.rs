//! Keyword index
//!
//! Lexical retrieval over chunk text. Queries are reduced to a handful of
//! distinct terms by [`extract_terms`]; chunks are ranked by a saturating
//! term-frequency score in `0..1`.

mod sqlite;

pub use sqlite::*;

use crate::error::Result;
use crate::models::{IndexEntry, IndexFilter, ScoredChunk};
use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Term-based index over chunk text
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Insert or replace entries
    async fn index(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Top `k` chunks passing `filter` that contain at least one of `terms`
    async fn search(&self, terms: &[String], filter: &IndexFilter, k: usize)
        -> Result<Vec<ScoredChunk>>;

    /// Remove every entry passing `filter`
    async fn delete(&self, filter: &IndexFilter) -> Result<()>;

    /// Number of entries passing `filter`
    async fn count(&self, filter: &IndexFilter) -> Result<usize>;
}

/// Lowercased query terms: stopwords and words of two characters or fewer
/// dropped, first `max_terms` distinct terms kept in order of appearance.
pub fn extract_terms(query: &str, max_terms: usize) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.unicode_words() {
        if terms.len() >= max_terms {
            break;
        }
        let word = word.to_lowercase();
        if word.chars().count() <= 2 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// Mean of `tf / (tf + 1)` over `terms`, where `tf` counts occurrences
/// of the term in `text_lower`
pub fn term_frequency_score(text_lower: &str, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let total: f32 = terms
        .iter()
        .map(|term| {
            let tf = text_lower.matches(term.as_str()).count() as f32;
            tf / (tf + 1.0)
        })
        .sum();
    total / terms.len() as f32
}
