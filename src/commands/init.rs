//! Init command implementation

use crate::config::{Config, PathsConfig, VectorBackend};
use crate::error::{Error, Result};
use crate::keyword::SqliteKeywordIndex;
use crate::meta::MetaDb;
use crate::store::QdrantStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Overrides the default vector backend in the written config
    pub backend: Option<VectorBackend>,
}

/// What `init` created
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub config_path: String,
    pub db_path: String,
    pub vector_backend: VectorBackend,
    /// Whether the Qdrant collection exists after init (None for other backends)
    pub collection_ready: Option<bool>,
}

/// Write a default configuration and create the database
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        backend,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.paths = PathsConfig {
        config_file: config_path.clone(),
        db_file: base_dir.join("recall.db"),
        base_dir,
    };
    if let Some(backend) = backend {
        config.vector.backend = backend;
    }
    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    let db = MetaDb::connect(&config).await?;
    SqliteKeywordIndex::new(db.pool().clone()).await?;
    info!("Created database at {:?}", config.paths.db_file);

    let collection_ready = match config.vector.backend {
        VectorBackend::Qdrant => Some(prepare_collection(&config).await),
        VectorBackend::Memory => None,
    };

    Ok(InitReport {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        vector_backend: config.vector.backend,
        collection_ready,
    })
}

async fn prepare_collection(config: &Config) -> bool {
    let result = match QdrantStore::connect(config) {
        Ok(store) => store.ensure_collection().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!("Qdrant collection '{}' ready", config.vector.collection_name);
            true
        }
        Err(e) => {
            warn!(
                "Could not prepare Qdrant collection at {}: {}. It is created on first ingest.",
                config.vector.qdrant_url, e
            );
            false
        }
    }
}

/// Print the init report to console
pub fn print_init_report(report: &InitReport) {
    println!("✓ recall initialized successfully");
    println!("  Config: {}", report.config_path);
    println!("  Database: {}", report.db_path);
    match report.collection_ready {
        Some(true) => println!("  Vector index: qdrant (collection ready)"),
        Some(false) => println!("  Vector index: qdrant (not reachable yet)"),
        None => println!("  Vector index: memory (rebuilt from the database on each run)"),
    }
    println!("\nNext steps:");
    println!("  recall ingest ./notes --owner alice        # Index local text files");
    println!("  recall query \"Q3 roadmap\" --owner alice    # Search them");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
            backend: Some(VectorBackend::Memory),
        }
    }

    #[tokio::test]
    async fn test_init_writes_config_and_database() {
        let tmp = TempDir::new().unwrap();
        let report = cmd_init(options(&tmp, false)).await.unwrap();

        assert!(tmp.path().join("config.toml").exists());
        assert!(tmp.path().join("recall.db").exists());
        assert_eq!(report.collection_ready, None);

        let config = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.vector.backend, VectorBackend::Memory);
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false)).await.unwrap();

        let err = cmd_init(options(&tmp, false)).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(cmd_init(options(&tmp, true)).await.is_ok());
    }
}
