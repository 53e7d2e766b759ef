//! Ingest command implementation

use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::models::{DocumentMetadata, IngestOutcome, IngestRequest};
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use ignore::WalkBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Extensions that are never plain text
const SKIP_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "mp3", "mp4", "wav", "ogg", "webm", "avi",
    "mov", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "exe", "dll", "so", "dylib", "bin",
    "woff", "woff2", "ttf", "otf", "pyc", "class", "o", "obj", "pdf", "docx", "lock",
];

/// Options shared by every document of one ingest run
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub owner_id: String,
    /// Title for a single document; files of a directory default to their name
    pub title: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Suppress the progress bar
    pub quiet: bool,
}

/// Outcome for one ingested input
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: String,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// Ingest statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub documents_created: usize,
    pub conflicts: usize,
    pub chunks_created: usize,
    pub degraded_chunks: usize,
    pub files_skipped: usize,
    pub outcomes: Vec<FileOutcome>,
    pub errors: Vec<String>,
}

impl IngestStats {
    fn record(&mut self, path: String, outcome: IngestOutcome) {
        match &outcome {
            IngestOutcome::Created {
                chunk_count,
                degraded_chunks,
                ..
            } => {
                self.documents_created += 1;
                self.chunks_created += chunk_count;
                self.degraded_chunks += degraded_chunks;
            }
            IngestOutcome::Conflict { .. } => self.conflicts += 1,
        }
        self.outcomes.push(FileOutcome { path, outcome });
    }
}

/// Ingest a file, a directory or stdin (`-`)
pub async fn cmd_ingest(
    ingestor: &Ingestor,
    target: &str,
    options: &IngestOptions,
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();

    if target == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        let outcome = ingestor
            .ingest(build_request(text, options, None, options.title.clone()))
            .await?;
        stats.record("-".to_string(), outcome);
        return Ok(stats);
    }

    let path = PathBuf::from(target);
    if path.is_dir() {
        ingest_dir(ingestor, &path, options, &mut stats).await?;
        return Ok(stats);
    }

    match read_text_file(&path)? {
        Some(text) => {
            let title = options.title.clone().or_else(|| file_title(&path));
            let source = Some(path.display().to_string());
            let outcome = ingestor
                .ingest(build_request(text, options, source, title))
                .await?;
            stats.record(path.display().to_string(), outcome);
        }
        None => {
            return Err(Error::Validation(format!(
                "{} is not a plain-text file",
                path.display()
            )))
        }
    }

    Ok(stats)
}

async fn ingest_dir(
    ingestor: &Ingestor,
    root: &Path,
    options: &IngestOptions,
    stats: &mut IngestStats,
) -> Result<()> {
    let root = root.canonicalize()?;
    info!("Ingesting directory: {}", root.display());

    let files = collect_files(&root);
    info!("Found {} files to process", files.len());

    let progress = start_progress_bar(files.len(), "Ingesting files", options.quiet);

    for path in files {
        let file_name = path.display().to_string();
        match ingest_file(ingestor, &path, options).await {
            Ok(Some(outcome)) => stats.record(file_name, outcome),
            Ok(None) => {
                debug!("Skipping non-text file: {}", file_name);
                stats.files_skipped += 1;
            }
            Err(e) => {
                let message = format!("{}: {}", file_name, e);
                warn!("{}", message);
                stats.errors.push(message);
            }
        }
        advance_progress(&progress);
    }

    finish_progress(progress, "Files ingested");

    info!(
        "Ingestion complete: {} documents, {} chunks, {} unchanged, {} skipped",
        stats.documents_created, stats.chunks_created, stats.conflicts, stats.files_skipped
    );
    Ok(())
}

async fn ingest_file(
    ingestor: &Ingestor,
    path: &Path,
    options: &IngestOptions,
) -> Result<Option<IngestOutcome>> {
    let Some(text) = read_text_file(path)? else {
        return Ok(None);
    };
    if text.trim().is_empty() {
        return Ok(None);
    }

    let title = file_title(path);
    let source = Some(path.display().to_string());
    ingestor
        .ingest(build_request(text, options, source, title))
        .await
        .map(Some)
}

/// Files below `root`, honouring .gitignore, in a stable order
fn collect_files(root: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    walker
        .filter_map(|entry| entry.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.into_path())
        .filter(|p| !should_skip_file(p))
        .collect()
}

/// File content when it looks like UTF-8 text
fn read_text_file(path: &Path) -> Result<Option<String>> {
    if should_skip_file(path) {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    if is_binary_content(&bytes) {
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}

/// Null bytes in the first 8KB mark a binary file
pub fn is_binary_content(data: &[u8]) -> bool {
    let check_len = data.len().min(8192);
    data[..check_len].contains(&0)
}

pub fn should_skip_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SKIP_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_title(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
}

fn build_request(
    text: String,
    options: &IngestOptions,
    source: Option<String>,
    title: Option<String>,
) -> IngestRequest {
    IngestRequest::new(text, options.owner_id.clone()).with_metadata(DocumentMetadata {
        title,
        category: options.category.clone(),
        tags: options.tags.clone(),
        source,
        ..Default::default()
    })
}

/// Print ingest statistics to console
pub fn print_ingest_stats(stats: &IngestStats) {
    for item in &stats.outcomes {
        match &item.outcome {
            IngestOutcome::Created {
                document_id,
                chunk_count,
                degraded_chunks,
            } => {
                print!("✓ {} → {} ({} chunks", item.path, document_id, chunk_count);
                if *degraded_chunks > 0 {
                    print!(", {} without a real embedding", degraded_chunks);
                }
                println!(")");
            }
            IngestOutcome::Conflict { document_id, .. } => {
                println!("= {} already stored as {}", item.path, document_id);
            }
        }
    }

    if stats.outcomes.len() > 1 || stats.files_skipped > 0 || !stats.errors.is_empty() {
        println!("\n✓ Ingestion complete");
        println!("  Documents created: {}", stats.documents_created);
        println!("  Already stored: {}", stats.conflicts);
        println!("  Chunks created: {}", stats.chunks_created);
        println!("  Files skipped: {}", stats.files_skipped);
    }

    if !stats.errors.is_empty() {
        println!("\n✗ {} files failed:", stats.errors.len());
        for error in &stats.errors {
            println!("  {}", error);
        }
    }
}
