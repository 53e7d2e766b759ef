//! CLI commands implementation

pub mod documents;
pub mod ingest;
pub mod init;
pub mod query;
pub mod reindex;
pub mod status;

pub use documents::*;
pub use ingest::*;
pub use init::*;
pub use query::*;
pub use reindex::*;
pub use status::*;

use crate::augment::HttpAugmenter;
use crate::config::{Config, VectorBackend};
use crate::embed::{create_embedder, Embedder};
use crate::error::Result;
use crate::ingest::Ingestor;
use crate::keyword::SqliteKeywordIndex;
use crate::meta::MetaDb;
use crate::search::SearchCoordinator;
use crate::store::{MemoryVectorIndex, QdrantStore, VectorIndex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Concrete collaborators built from a configuration file
pub struct Pipeline {
    pub config: Config,
    pub db: MetaDb,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorIndex>,
    pub keywords: Arc<SqliteKeywordIndex>,
    /// Set when the vector backend is Qdrant
    pub qdrant: Option<Arc<QdrantStore>>,
}

impl Pipeline {
    /// Open the database and connect every backend named in `config`.
    ///
    /// The in-memory vector backend keeps nothing between runs, so it is
    /// filled from the stored embeddings before the pipeline is returned.
    pub async fn open(config: Config) -> Result<Self> {
        let db = MetaDb::connect(&config).await?;
        let keywords = Arc::new(SqliteKeywordIndex::new(db.pool().clone()).await?);
        let embedder = create_embedder(
            &config.embedding,
            Duration::from_millis(config.calls.embedding_timeout_ms),
        )?;

        let (vectors, qdrant) = match config.vector.backend {
            VectorBackend::Qdrant => {
                let store = Arc::new(QdrantStore::connect(&config)?);
                let vectors: Arc<dyn VectorIndex> = store.clone();
                (vectors, Some(store))
            }
            VectorBackend::Memory => {
                let vectors: Arc<dyn VectorIndex> =
                    Arc::new(MemoryVectorIndex::new(config.embedding.dimension));
                (vectors, None)
            }
        };

        let pipeline = Self {
            config,
            db,
            embedder,
            vectors,
            keywords,
            qdrant,
        };

        if pipeline.config.vector.backend == VectorBackend::Memory {
            let restored = pipeline.ingestor().restore_indexes().await?;
            debug!("Loaded {} stored vectors into memory", restored);
        }

        Ok(pipeline)
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            self.db.clone(),
            self.embedder.clone(),
            self.vectors.clone(),
            self.keywords.clone(),
        )
        .with_config(&self.config)
    }

    /// Search coordinator with the audit log and, when enabled, the augmenter
    pub fn coordinator(&self) -> Result<SearchCoordinator> {
        let mut coordinator = SearchCoordinator::new(
            self.embedder.clone(),
            self.vectors.clone(),
            self.keywords.clone(),
        )
        .with_config(&self.config)
        .with_audit(self.db.clone());

        if self.config.augment.enabled {
            info!("Augmentation enabled via {}", self.config.augment.url);
            let augmenter = HttpAugmenter::new(
                &self.config.augment,
                Duration::from_millis(self.config.calls.augment_timeout_ms),
            )?;
            coordinator = coordinator.with_augmenter(Arc::new(augmenter));
        }

        Ok(coordinator)
    }
}
