//! Configuration management for recall
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::retry::CallPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Vector index backend
    #[serde(default)]
    pub vector: VectorConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Keyword extraction configuration
    #[serde(default)]
    pub keyword: KeywordConfig,

    /// Search limits
    #[serde(default)]
    pub search: SearchConfig,

    /// Composite score weights
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Generative augmentation of results
    #[serde(default)]
    pub augment: AugmentConfig,

    /// Timeouts and retries for external calls
    #[serde(default)]
    pub calls: CallsConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Which vector index implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Qdrant,
    /// In-process exact search, nothing persisted
    Memory,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_vector_backend")]
    pub backend: VectorBackend,

    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

/// What to do when the embedding provider stays down after retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingFailurePolicy {
    /// Fail the ingestion
    Strict,
    /// Store a flagged placeholder vector and keep going
    Placeholder,
}

/// Where embeddings are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/v1/embeddings` endpoint
    Http,
    /// In-process fastembed model (`local-embed` feature)
    Local,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Base URL of an OpenAI-compatible embeddings server
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Batches in flight at once
    #[serde(default = "default_embedding_concurrency")]
    pub concurrency: usize,

    /// Environment variable holding the API key (unset variable = no auth)
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_embedding_failure_policy")]
    pub failure_policy: EmbeddingFailurePolicy,
}

/// Lookup the expected embedding dimension for a known model
pub fn embedding_dimension_for_model(model: &str) -> Option<usize> {
    match model {
        "BAAI/bge-small-en-v1.5" => Some(384),
        "BAAI/bge-base-en-v1.5" => Some(768),
        "BAAI/bge-large-en-v1.5" => Some(1024),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(384),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

impl EmbeddingConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        read_env(&self.api_key_env)
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between adjacent chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

/// Keyword index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Distinct query terms kept after stopword removal
    #[serde(default = "default_keyword_max_terms")]
    pub max_terms: usize,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Maximum results allowed
    #[serde(default = "default_search_max_limit")]
    pub max_limit: usize,
}

/// Weights of the composite score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Weight applied to the raw similarity (0..1)
    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f32,

    /// Cap of the length-adequacy bonus
    #[serde(default = "default_length_weight")]
    pub length_weight: f32,

    /// Chunks at or below this length get no length bonus
    #[serde(default = "default_min_informative_chars")]
    pub min_informative_chars: usize,

    /// Length at which the length bonus reaches its cap
    #[serde(default = "default_length_saturation_chars")]
    pub length_saturation_chars: usize,

    /// Bonus for a chunk created just now
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f32,

    /// Age at which the recency bonus has decayed to zero
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: u32,

    /// Bonus when the query mentions the chunk's category or a tag
    #[serde(default = "default_tag_weight")]
    pub tag_weight: f32,
}

/// Generative augmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentConfig {
    #[serde(default = "default_augment_enabled")]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible chat-completions server
    #[serde(default = "default_augment_url")]
    pub url: String,

    #[serde(default = "default_augment_model")]
    pub model: String,

    #[serde(default = "default_augment_api_key_env")]
    pub api_key_env: String,

    /// Number of top results sent along with the query
    #[serde(default = "default_augment_top_n")]
    pub top_n: usize,

    /// Characters kept from each result
    #[serde(default = "default_augment_excerpt_chars")]
    pub excerpt_chars: usize,

    #[serde(default = "default_augment_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_augment_temperature")]
    pub temperature: f32,
}

impl AugmentConfig {
    pub fn api_key(&self) -> Option<String> {
        read_env(&self.api_key_env)
    }
}

/// Timeouts and retries for every external call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsConfig {
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    #[serde(default = "default_index_timeout_ms")]
    pub index_timeout_ms: u64,

    #[serde(default = "default_augment_timeout_ms")]
    pub augment_timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(default = "default_call_retries")]
    pub retries: u32,

    /// Base backoff; attempt `n` waits `n * backoff_ms`
    #[serde(default = "default_call_backoff_ms")]
    pub backoff_ms: u64,
}

impl CallsConfig {
    fn policy(&self, timeout_ms: u64) -> CallPolicy {
        CallPolicy::new(
            Duration::from_millis(timeout_ms),
            self.retries,
            Duration::from_millis(self.backoff_ms),
        )
    }

    pub fn embedding_policy(&self) -> CallPolicy {
        self.policy(self.embedding_timeout_ms)
    }

    pub fn index_policy(&self) -> CallPolicy {
        self.policy(self.index_timeout_ms)
    }

    pub fn augment_policy(&self) -> CallPolicy {
        self.policy(self.augment_timeout_ms)
    }
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for recall data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            concurrency: default_embedding_concurrency(),
            api_key_env: default_embedding_api_key_env(),
            failure_policy: default_embedding_failure_policy(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            max_terms: default_keyword_max_terms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_search_max_limit(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            similarity_weight: default_similarity_weight(),
            length_weight: default_length_weight(),
            min_informative_chars: default_min_informative_chars(),
            length_saturation_chars: default_length_saturation_chars(),
            recency_weight: default_recency_weight(),
            recency_window_days: default_recency_window_days(),
            tag_weight: default_tag_weight(),
        }
    }
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_augment_enabled(),
            url: default_augment_url(),
            model: default_augment_model(),
            api_key_env: default_augment_api_key_env(),
            top_n: default_augment_top_n(),
            excerpt_chars: default_augment_excerpt_chars(),
            max_tokens: default_augment_max_tokens(),
            temperature: default_augment_temperature(),
        }
    }
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            embedding_timeout_ms: default_embedding_timeout_ms(),
            index_timeout_ms: default_index_timeout_ms(),
            augment_timeout_ms: default_augment_timeout_ms(),
            retries: default_call_retries(),
            backoff_ms: default_call_backoff_ms(),
        }
    }
}

impl Config {
    /// Get the default base directory for recall (~/.recall)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".recall")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("recall.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("recall.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        read_env(&self.vector.qdrant_api_key_env)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.chunk_size == 0 {
            return Err(Error::Config("chunk.chunk_size must be > 0".to_string()));
        }

        if self.chunk.overlap >= self.chunk.chunk_size {
            return Err(Error::Config(
                "chunk.overlap must be < chunk.chunk_size".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be > 0".to_string()));
        }

        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(Error::Config(
                "embedding.batch_size and embedding.concurrency must be > 0".to_string(),
            ));
        }

        if let Some(expected) = embedding_dimension_for_model(&self.embedding.model) {
            if expected != self.embedding.dimension {
                return Err(Error::Config(format!(
                    "embedding.dimension is {} but model '{}' produces {}",
                    self.embedding.dimension, self.embedding.model, expected
                )));
            }
        }

        if self.keyword.max_terms == 0 {
            return Err(Error::Config("keyword.max_terms must be > 0".to_string()));
        }

        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            return Err(Error::Config(
                "search.default_limit must be between 1 and search.max_limit".to_string(),
            ));
        }

        let weights = [
            ("ranking.similarity_weight", self.ranking.similarity_weight),
            ("ranking.length_weight", self.ranking.length_weight),
            ("ranking.recency_weight", self.ranking.recency_weight),
            ("ranking.tag_weight", self.ranking.tag_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }

        if self.ranking.length_saturation_chars == 0 || self.ranking.recency_window_days == 0 {
            return Err(Error::Config(
                "ranking.length_saturation_chars and ranking.recency_window_days must be > 0"
                    .to_string(),
            ));
        }

        if self.augment.top_n == 0 || self.augment.excerpt_chars == 0 {
            return Err(Error::Config(
                "augment.top_n and augment.excerpt_chars must be > 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.augment.temperature) {
            return Err(Error::Config(
                "augment.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.calls.embedding_timeout_ms == 0
            || self.calls.index_timeout_ms == 0
            || self.calls.augment_timeout_ms == 0
        {
            return Err(Error::Config("call timeouts must be > 0".to_string()));
        }

        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
