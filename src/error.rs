//! Custom error types for recall

use thiserror::Error;

/// Main error type for recall operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {millis}ms: {what}")]
    Timeout { what: String, millis: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Augmentation error: {0}")]
    Augment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'recall init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Collapse an adapter-level failure into `ProviderUnavailable`, keeping
    /// the typed boundary variants untouched.
    pub fn into_provider_unavailable(self) -> Self {
        match self {
            e @ (Error::Validation(_) | Error::ProviderUnavailable(_) | Error::NotFound(_)) => e,
            other => Error::ProviderUnavailable(other.to_string()),
        }
    }

    /// Collapse an adapter-level failure into `IndexUnavailable`.
    pub fn into_index_unavailable(self) -> Self {
        match self {
            e @ (Error::Validation(_) | Error::IndexUnavailable(_) | Error::NotFound(_)) => e,
            other => Error::IndexUnavailable(other.to_string()),
        }
    }
}

/// Result type alias for recall
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_variants_survive_translation() {
        let err = Error::Validation("empty query".to_string()).into_index_unavailable();
        assert!(matches!(err, Error::Validation(_)));

        let err = Error::Qdrant("connection refused".to_string()).into_index_unavailable();
        match err {
            Error::IndexUnavailable(msg) => assert!(msg.contains("connection refused")),
            other => panic!("expected index unavailable, got {other:?}"),
        }

        let err = Error::Embedding("503".to_string()).into_provider_unavailable();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            what: "vector query".to_string(),
            millis: 250,
        };
        assert_eq!(err.to_string(), "Timed out after 250ms: vector query");
    }
}
