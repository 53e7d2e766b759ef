//! recall CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use recall::{
    commands::{
        cmd_delete_document, cmd_history, cmd_ingest, cmd_init, cmd_list_documents,
        cmd_owner_stats, cmd_query, cmd_reindex, cmd_status, print_documents, print_history,
        print_ingest_stats, print_init_report, print_owner_report, print_query_results,
        print_reindex_stats, print_status, IngestOptions, InitOptions, Pipeline, QueryOptions,
    },
    config::{Config, VectorBackend},
    error::{Error, Result},
    models::SearchType,
    progress::LogWriterFactory,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "recall")]
#[command(version, about = "Hybrid semantic and keyword search over your own documents", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit log lines as JSON objects
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,

        /// Vector index backend to configure
        #[arg(long, value_parser = ["qdrant", "memory"])]
        backend: Option<String>,
    },

    /// Ingest a text file, a directory of text files, or stdin (-)
    Ingest {
        /// File, directory, or '-' for stdin
        path: String,

        /// Owner of the ingested documents
        #[arg(long, env = "RECALL_OWNER")]
        owner: String,

        /// Document title (files default to their name)
        #[arg(long)]
        title: Option<String>,

        /// Document category
        #[arg(long)]
        category: Option<String>,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Search an owner's documents
    Query {
        /// The search query
        query: String,

        /// Owner whose documents are searched
        #[arg(long, env = "RECALL_OWNER")]
        owner: String,

        /// semantic, keyword or hybrid
        #[arg(long = "type", default_value = "hybrid")]
        search_type: SearchType,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only search these documents (repeatable)
        #[arg(long = "document")]
        documents: Vec<String>,

        /// Only search documents of this category
        #[arg(long)]
        category: Option<String>,

        /// Skip generative insight even when enabled in config
        #[arg(long)]
        no_augment: bool,
    },

    /// Delete a document and everything derived from it
    Delete {
        /// Document ID (use 'recall documents' to list)
        document_id: String,

        #[arg(long, env = "RECALL_OWNER")]
        owner: String,
    },

    /// List an owner's documents
    Documents {
        #[arg(long, env = "RECALL_OWNER")]
        owner: String,
    },

    /// Show statistics for an owner
    Stats {
        #[arg(long, env = "RECALL_OWNER")]
        owner: String,
    },

    /// Show an owner's recent searches
    History {
        #[arg(long, env = "RECALL_OWNER")]
        owner: String,

        /// Number of searches to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show configuration and backend status
    Status,

    /// Rebuild the vector and keyword indexes from the database
    Reindex {
        /// Drop and recreate the Qdrant collection first
        #[arg(long)]
        recreate: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Run the CLI; the returned value is the process exit code
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(LogWriterFactory))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(LogWriterFactory))
            .init();
    }

    let command = match cli.command {
        Commands::Init { force, backend } => {
            let (base_dir, config_path) = init_paths(cli.config);
            let backend = backend.map(|b| match b.as_str() {
                "memory" => VectorBackend::Memory,
                _ => VectorBackend::Qdrant,
            });
            let report = cmd_init(InitOptions {
                base_dir,
                config_path,
                force,
                backend,
            })
            .await?;
            emit(cli.json, &report, print_init_report)?;
            return Ok(0);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "recall", &mut std::io::stdout());
            return Ok(0);
        }
        other => other,
    };

    let config = load_config(cli.config)?;
    let pipeline = Pipeline::open(config).await?;

    match command {
        Commands::Ingest {
            path,
            owner,
            title,
            category,
            tags,
        } => {
            let options = IngestOptions {
                owner_id: owner,
                title,
                category,
                tags,
                quiet: cli.json,
            };
            let stats = cmd_ingest(&pipeline.ingestor(), &path, &options).await?;
            emit(cli.json, &stats, print_ingest_stats)?;
            if !stats.errors.is_empty() {
                return Ok(1);
            }
        }

        Commands::Query {
            query,
            owner,
            search_type,
            limit,
            documents,
            category,
            no_augment,
        } => {
            let options = QueryOptions {
                owner_id: owner,
                search_type,
                limit,
                document_ids: documents,
                category,
                no_augment,
            };
            let coordinator = pipeline.coordinator()?;
            let outcome = cmd_query(&coordinator, &query, options).await?;
            emit(cli.json, &outcome, print_query_results)?;
            if outcome.is_unavailable() {
                return Ok(2);
            }
        }

        Commands::Delete { document_id, owner } => {
            cmd_delete_document(&pipeline.ingestor(), &document_id, &owner).await?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({"status": "deleted", "document_id": document_id})
                );
            } else {
                println!("✓ Document '{}' deleted", document_id);
            }
        }

        Commands::Documents { owner } => {
            let docs = cmd_list_documents(&pipeline.db, &owner).await?;
            emit(cli.json, &docs, |docs| print_documents(&owner, docs))?;
        }

        Commands::Stats { owner } => {
            let report = cmd_owner_stats(&pipeline, &owner).await?;
            emit(cli.json, &report, print_owner_report)?;
        }

        Commands::History { owner, limit } => {
            let queries = cmd_history(&pipeline.db, &owner, limit).await?;
            emit(cli.json, &queries, |q| print_history(&owner, q))?;
        }

        Commands::Status => {
            let status = cmd_status(&pipeline).await?;
            emit(cli.json, &status, print_status)?;
        }

        Commands::Reindex { recreate } => {
            let stats = cmd_reindex(&pipeline, recreate).await?;
            emit(cli.json, &stats, print_reindex_stats)?;
        }

        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),
    }

    Ok(0)
}

/// Print `value` as pretty JSON or through its console printer
fn emit<T, F>(json: bool, value: &T, print: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T),
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

/// Base directory and config file: the parent of `--config` when given (a directory means `<dir>/config.toml`), `~/.recall` otherwise
fn init_paths(config: Option<PathBuf>) -> (PathBuf, PathBuf) {
    match config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let (_, config_path) = init_paths(path);
    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }
    Config::load(&config_path)
}
