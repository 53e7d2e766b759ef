//! SQLite-backed keyword index

use super::{term_frequency_score, KeywordIndex};
use crate::error::{Error, Result};
use crate::models::{ChunkMetadata, IndexEntry, IndexFilter, ScoredChunk};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::cmp::Ordering;
use tracing::debug;

const KEYWORD_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS keyword_chunks (
    chunk_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    category TEXT,
    text TEXT NOT NULL,
    text_lower TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_keyword_owner ON keyword_chunks(owner_id, document_id);
"#;

#[derive(Debug, FromRow)]
struct KeywordRow {
    chunk_id: String,
    text: String,
    text_lower: String,
    metadata_json: String,
}

/// Keyword index stored in the metadata database
#[derive(Clone)]
pub struct SqliteKeywordIndex {
    pool: SqlitePool,
}

impl SqliteKeywordIndex {
    /// Use `pool`, creating the keyword table if needed
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(KEYWORD_SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }
}

/// `WHERE` clause and its bind values for `filter`
fn filter_clause(filter: &IndexFilter) -> (String, Vec<String>) {
    let mut clause = String::from("owner_id = ?");
    let mut binds = vec![filter.owner_id.clone()];

    if !filter.document_ids.is_empty() {
        let placeholders = filter
            .document_ids
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        clause.push_str(&format!(" AND document_id IN ({})", placeholders));
        binds.extend(filter.document_ids.iter().cloned());
    }

    if let Some(ref category) = filter.category {
        clause.push_str(" AND category = ?");
        binds.push(category.clone());
    }

    (clause, binds)
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl KeywordIndex for SqliteKeywordIndex {
    async fn index(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO keyword_chunks (chunk_id, owner_id, document_id, category, text, text_lower, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    document_id = excluded.document_id,
                    category = excluded.category,
                    text = excluded.text,
                    text_lower = excluded.text_lower,
                    metadata_json = excluded.metadata_json,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&entry.chunk_id)
            .bind(&entry.metadata.owner_id)
            .bind(&entry.metadata.document_id)
            .bind(&entry.metadata.category)
            .bind(&entry.text)
            .bind(entry.text.to_lowercase())
            .bind(serde_json::to_string(&entry.metadata)?)
            .bind(entry.metadata.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Indexed {} chunks for keyword search", entries.len());
        Ok(())
    }

    async fn search(
        &self,
        terms: &[String],
        filter: &IndexFilter,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        filter.validate()?;
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let (clause, mut binds) = filter_clause(filter);
        let likes = terms
            .iter()
            .map(|_| "text_lower LIKE ? ESCAPE '\\'")
            .collect::<Vec<_>>()
            .join(" OR ");
        binds.extend(terms.iter().map(|t| like_pattern(t)));

        let sql = format!(
            "SELECT chunk_id, text, text_lower, metadata_json FROM keyword_chunks WHERE {} AND ({})",
            clause, likes
        );

        let mut query = sqlx::query_as::<_, KeywordRow>(&sql);
        for value in &binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut scored = rows
            .into_iter()
            .map(|row| {
                let metadata: ChunkMetadata = serde_json::from_str(&row.metadata_json)
                    .map_err(|e| Error::Other(format!("Unreadable keyword entry: {}", e)))?;
                Ok(ScoredChunk {
                    similarity: term_frequency_score(&row.text_lower, terms),
                    chunk_id: row.chunk_id,
                    text: row.text,
                    metadata,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        scored.retain(|c| c.similarity > 0.0);
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.metadata.created_at.cmp(&b.metadata.created_at))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);

        debug!(
            "Keyword search for {:?} returned {} chunks",
            terms,
            scored.len()
        );
        Ok(scored)
    }

    async fn delete(&self, filter: &IndexFilter) -> Result<()> {
        filter.validate()?;
        let (clause, binds) = filter_clause(filter);
        let sql = format!("DELETE FROM keyword_chunks WHERE {}", clause);

        let mut query = sqlx::query(&sql);
        for value in &binds {
            query = query.bind(value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self, filter: &IndexFilter) -> Result<usize> {
        filter.validate()?;
        let (clause, binds) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM keyword_chunks WHERE {}", clause);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in &binds {
            query = query.bind(value);
        }
        Ok(query.fetch_one(&self.pool).await? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaDb;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    async fn setup_index() -> (SqliteKeywordIndex, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        let index = SqliteKeywordIndex::new(db.pool().clone()).await.unwrap();
        (index, tmp)
    }

    fn entry(id: &str, owner: &str, doc: &str, text: &str, age_days: i64) -> IndexEntry {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        IndexEntry {
            chunk_id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                owner_id: owner.to_string(),
                document_id: doc.to_string(),
                chunk_index: 0,
                start_offset: 0,
                end_offset: text.chars().count(),
                title: None,
                category: None,
                tags: Vec::new(),
                created_at: base - Duration::days(age_days),
                degraded: false,
            },
        }
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn test_search_ranks_by_term_frequency() {
        let (index, _tmp) = setup_index().await;
        index
            .index(vec![
                entry("a", "alice", "d1", "The roadmap for Q3.", 0),
                entry("b", "alice", "d1", "Roadmap, roadmap and budget.", 0),
                entry("c", "alice", "d1", "Lunch menu.", 0),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&terms(&["roadmap", "budget"]), &IndexFilter::owner("alice"), 10)
            .await
            .unwrap();

        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(hits.iter().all(|h| h.similarity > 0.0 && h.similarity < 1.0));
    }

    #[tokio::test]
    async fn test_ties_prefer_older_chunks() {
        let (index, _tmp) = setup_index().await;
        index
            .index(vec![
                entry("new", "alice", "d1", "roadmap", 1),
                entry("old", "alice", "d1", "roadmap", 10),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&terms(&["roadmap"]), &IndexFilter::owner("alice"), 10)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk_id, "old");
    }

    #[tokio::test]
    async fn test_owner_and_document_filters() {
        let (index, _tmp) = setup_index().await;
        index
            .index(vec![
                entry("a", "alice", "d1", "roadmap one", 0),
                entry("b", "alice", "d2", "roadmap two", 0),
                entry("c", "bob", "d3", "roadmap roadmap roadmap", 0),
            ])
            .await
            .unwrap();

        let mine = index
            .search(&terms(&["roadmap"]), &IndexFilter::owner("alice"), 10)
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|h| h.metadata.owner_id == "alice"));

        let scoped = index
            .search(&terms(&["roadmap"]), &IndexFilter::document("alice", "d2"), 10)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].chunk_id, "b");
    }

    #[tokio::test]
    async fn test_empty_terms_and_wildcards() {
        let (index, _tmp) = setup_index().await;
        index
            .index(vec![entry("a", "alice", "d1", "plain text", 0)])
            .await
            .unwrap();

        assert!(index
            .search(&[], &IndexFilter::owner("alice"), 10)
            .await
            .unwrap()
            .is_empty());

        // LIKE wildcards in terms match literally
        assert!(index
            .search(&terms(&["%"]), &IndexFilter::owner("alice"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let (index, _tmp) = setup_index().await;
        index
            .index(vec![
                entry("a", "alice", "d1", "roadmap", 0),
                entry("b", "alice", "d2", "roadmap", 0),
            ])
            .await
            .unwrap();
        assert_eq!(index.count(&IndexFilter::owner("alice")).await.unwrap(), 2);

        index.delete(&IndexFilter::document("alice", "d1")).await.unwrap();
        assert_eq!(index.count(&IndexFilter::owner("alice")).await.unwrap(), 1);
        assert_eq!(index.count(&IndexFilter::owner("bob")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_requires_owner() {
        let (index, _tmp) = setup_index().await;
        let err = index
            .search(&terms(&["roadmap"]), &IndexFilter::owner(""), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
