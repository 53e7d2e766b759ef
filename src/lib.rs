//! recall: owner-scoped hybrid retrieval over personal documents
//!
//! Documents are chunked, embedded and written to a SQLite metadata store,
//! a vector index (Qdrant or in-process) and a keyword index. Searches run
//! both indexes concurrently, merge and re-rank the candidates, and degrade
//! to partial results instead of failing when one index is unreachable.

pub mod augment;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod keyword;
pub mod meta;
pub mod models;
pub mod progress;
pub mod rank;
pub mod retry;
pub mod search;
pub mod store;

pub use error::{Error, Result};
