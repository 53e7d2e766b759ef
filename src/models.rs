//! Shared data model: requests, metadata records and search outcomes.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Which indexes a search consults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Semantic,
    Keyword,
    #[default]
    Hybrid,
}

impl SearchType {
    pub fn uses_semantic(self) -> bool {
        matches!(self, SearchType::Semantic | SearchType::Hybrid)
    }

    pub fn uses_keyword(self) -> bool {
        matches!(self, SearchType::Keyword | SearchType::Hybrid)
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchType::Semantic => write!(f, "semantic"),
            SearchType::Keyword => write!(f, "keyword"),
            SearchType::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for SearchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "semantic" | "vector" => Ok(SearchType::Semantic),
            "keyword" | "lexical" => Ok(SearchType::Keyword),
            "hybrid" => Ok(SearchType::Hybrid),
            _ => Err(Error::Validation(format!("Unknown search type: {}", s))),
        }
    }
}

/// Caller-supplied description of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Where the text came from (file path, URL, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Metadata carried by every index entry and every search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub owner_id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub start_offset: usize,
    pub end_offset: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,

    /// Vector is a placeholder, not a real embedding
    #[serde(default)]
    pub degraded: bool,
}

/// Pre-filter applied by both indexes before any ranking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFilter {
    pub owner_id: String,
    /// Empty means every document of the owner
    pub document_ids: Vec<String>,
    pub category: Option<String>,
}

impl IndexFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn document(owner_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            document_ids: vec![document_id.into()],
            category: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(Error::Validation("owner_id is required".to_string()));
        }
        Ok(())
    }

    /// Whether an entry passes this filter
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if metadata.owner_id != self.owner_id {
            return false;
        }
        if !self.document_ids.is_empty() && !self.document_ids.contains(&metadata.document_id) {
            return false;
        }
        match &self.category {
            Some(category) => metadata.category.as_deref() == Some(category.as_str()),
            None => true,
        }
    }
}

/// A chunk as written to an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk as returned by an index, with its raw similarity in `0..=1`
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub similarity: f32,
    pub metadata: ChunkMetadata,
}

/// Which index surfaced a hit. Semantic sorts before Keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recall {
    Semantic,
    Keyword,
}

impl std::fmt::Display for Recall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recall::Semantic => write!(f, "semantic"),
            Recall::Keyword => write!(f, "keyword"),
        }
    }
}

/// Narrowing of a search beyond the owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchScope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A query against one owner's documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub owner_id: String,
    #[serde(default)]
    pub scope: SearchScope,
    #[serde(default)]
    pub search_type: SearchType,
    /// Falls back to the configured default
    #[serde(default)]
    pub limit: Option<usize>,
    /// Ask the augmenter for an insight (when one is configured)
    #[serde(default = "default_true")]
    pub augment: bool,
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            owner_id: owner_id.into(),
            scope: SearchScope::default(),
            search_type: SearchType::default(),
            limit: None,
            augment: true,
        }
    }

    pub fn with_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn without_augment(mut self) -> Self {
        self.augment = false;
        self
    }

    pub fn filter(&self) -> IndexFilter {
        IndexFilter {
            owner_id: self.owner_id.clone(),
            document_ids: self.scope.document_ids.clone(),
            category: self.scope.category.clone(),
        }
    }
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub text: String,
    /// Composite score
    pub score: f32,
    /// Raw similarity reported by the index
    pub similarity: f32,
    pub recall: Recall,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    /// Every requested index answered
    Complete,
    /// Some results, at least one index missing or the search was cancelled
    Partial,
    /// No requested index answered
    Unavailable,
}

impl std::fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStatus::Complete => write!(f, "complete"),
            SearchStatus::Partial => write!(f, "partial"),
            SearchStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

impl FromStr for SearchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "complete" => Ok(SearchStatus::Complete),
            "partial" => Ok(SearchStatus::Partial),
            "unavailable" => Ok(SearchStatus::Unavailable),
            _ => Err(Error::Other(format!("Unknown search status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationReason {
    ProviderUnavailable,
    IndexUnavailable,
    Cancelled,
}

/// Why one leg of a search contributed nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub leg: Recall,
    pub reason: DegradationReason,
    pub detail: String,
}

/// Narrative produced by the augmenter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaps: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
    /// Reply text when it was not the expected JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// Result of a search. Only request validation produces an `Err`;
/// everything else is reported here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub search_type: SearchType,
    pub status: SearchStatus,
    pub partial: bool,
    pub cancelled: bool,
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<Insight>,
    pub elapsed_ms: u64,
}

impl SearchOutcome {
    pub fn is_unavailable(&self) -> bool {
        self.status == SearchStatus::Unavailable
    }
}

/// Text handed to ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    pub owner_id: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl IngestRequest {
    pub fn new(text: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            owner_id: owner_id.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of an ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestOutcome {
    Created {
        document_id: String,
        chunk_count: usize,
        /// Chunks stored with a placeholder vector
        degraded_chunks: usize,
    },
    /// Identical content already stored for this owner
    Conflict {
        document_id: String,
        chunk_count: usize,
    },
}

impl IngestOutcome {
    pub fn document_id(&self) -> &str {
        match self {
            IngestOutcome::Created { document_id, .. } => document_id,
            IngestOutcome::Conflict { document_id, .. } => document_id,
        }
    }

    pub fn chunk_count(&self) -> usize {
        match self {
            IngestOutcome::Created { chunk_count, .. } => *chunk_count,
            IngestOutcome::Conflict { chunk_count, .. } => *chunk_count,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, IngestOutcome::Conflict { .. })
    }
}
