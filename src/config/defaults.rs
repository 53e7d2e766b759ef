//! Default values for configuration

use super::{EmbeddingFailurePolicy, EmbeddingProvider, VectorBackend};

/// Default vector backend
pub fn default_vector_backend() -> VectorBackend {
    VectorBackend::Qdrant
}

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "recall_chunks".to_string()
}

/// Default embedding provider
pub fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Http
}

/// Default embedding endpoint (any OpenAI-compatible `/v1/embeddings` server)
pub fn default_embedding_url() -> String {
    std::env::var("RECALL_EMBEDDING_URL").unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (bge-small)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default number of embedding batches in flight
pub fn default_embedding_concurrency() -> usize {
    2
}

/// Default environment variable holding the embedding API key
pub fn default_embedding_api_key_env() -> String {
    "RECALL_EMBEDDING_API_KEY".to_string()
}

/// Default: fail ingestion when the provider is down
pub fn default_embedding_failure_policy() -> EmbeddingFailurePolicy {
    EmbeddingFailurePolicy::Strict
}

/// Default maximum characters per chunk
pub fn default_chunk_size() -> usize {
    1000
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default cap on extracted keyword terms
pub fn default_keyword_max_terms() -> usize {
    5
}

/// Default number of results
pub fn default_search_limit() -> usize {
    10
}

/// Maximum results allowed
pub fn default_search_max_limit() -> usize {
    50
}

pub fn default_similarity_weight() -> f32 {
    0.4
}

pub fn default_length_weight() -> f32 {
    0.2
}

pub fn default_min_informative_chars() -> usize {
    100
}

pub fn default_length_saturation_chars() -> usize {
    1000
}

pub fn default_recency_weight() -> f32 {
    0.1
}

pub fn default_recency_window_days() -> u32 {
    30
}

pub fn default_tag_weight() -> f32 {
    0.1
}

/// Augmentation is opt-in
pub fn default_augment_enabled() -> bool {
    false
}

/// Default chat-completions endpoint
pub fn default_augment_url() -> String {
    std::env::var("RECALL_AUGMENT_URL").unwrap_or_else(|_| "https://api.openai.com/v1/".to_string())
}

pub fn default_augment_model() -> String {
    "gpt-3.5-turbo".to_string()
}

pub fn default_augment_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Number of top passages handed to the augmenter
pub fn default_augment_top_n() -> usize {
    3
}

/// Characters kept from each passage
pub fn default_augment_excerpt_chars() -> usize {
    200
}

pub fn default_augment_max_tokens() -> u32 {
    300
}

pub fn default_augment_temperature() -> f32 {
    0.3
}

pub fn default_embedding_timeout_ms() -> u64 {
    30_000
}

pub fn default_index_timeout_ms() -> u64 {
    10_000
}

pub fn default_augment_timeout_ms() -> u64 {
    20_000
}

/// One retry before degrading
pub fn default_call_retries() -> u32 {
    1
}

pub fn default_call_backoff_ms() -> u64 {
    200
}
