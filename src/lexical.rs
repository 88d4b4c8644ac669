//! LexicalIndex: inverted-index keyword search over chunk text.
//!
//! The default backend shares the metadata SQLite file's `chunks_fts`
//! FTS5 virtual table. FTS5's `rank` is negative and lower-is-better; the
//! port contract requires higher-is-better scores, so the native rank is
//! negated on the way out.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::Chunk;

#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn upsert_chunks(&self, chunks: &[Chunk], doc_title: Option<&str>, doc_uri: &str) -> AppResult<()>;
    async fn delete_doc(&self, doc_id: Uuid) -> AppResult<()>;
    /// Returns `(chunk_id, score)` pairs, higher score first. A malformed
    /// FTS5 query (lexical-syntax error) returns an empty list rather
    /// than surfacing an error.
    async fn search(&self, query: &str, top_k: i64) -> AppResult<Vec<(Uuid, f64)>>;
}

pub struct Fts5LexicalIndex {
    pool: SqlitePool,
}

impl Fts5LexicalIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LexicalIndex for Fts5LexicalIndex {
    async fn upsert_chunks(&self, chunks: &[Chunk], doc_title: Option<&str>, doc_uri: &str) -> AppResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            // Idempotent: remove any existing row for this chunk_id before
            // inserting.
            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
                .bind(chunk.id.to_string())
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO chunks_fts (chunk_id, doc_id, title, uri, text) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(chunk.id.to_string())
            .bind(chunk.doc_id.to_string())
            .bind(doc_title)
            .bind(doc_uri)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_doc(&self, doc_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM chunks_fts WHERE doc_id = ?")
            .bind(doc_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str, top_k: i64) -> AppResult<Vec<(Uuid, f64)>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, rank
            FROM chunks_fts
            WHERE chunks_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(top_k)
        .fetch_all(&self.pool)
        .await;

        // An FTS5 syntax error (unbalanced quotes, bad operator, etc.)
        // must not propagate; treat it as "no matches".
        let rows = match rows {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk_id_str: String = row.try_get("chunk_id")?;
            let rank: f64 = row.try_get("rank")?;
            if let Ok(chunk_id) = Uuid::parse_str(&chunk_id_str) {
                results.push((chunk_id, -rank));
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query(
            "CREATE VIRTUAL TABLE chunks_fts USING fts5(chunk_id UNINDEXED, doc_id UNINDEXED, title, uri UNINDEXED, text)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn make_chunk(doc_id: Uuid, idx: i64, text: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            doc_id,
            chunk_index: idx,
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len() as i64,
            chunk_hash: "deadbeef".to_string(),
        }
    }

    #[tokio::test]
    async fn search_finds_matching_text() {
        let pool = memory_pool().await;
        let index = Fts5LexicalIndex::new(pool);
        let doc_id = Uuid::new_v4();
        let chunk = make_chunk(doc_id, 0, "the quick brown fox jumps");
        index
            .upsert_chunks(&[chunk.clone()], Some("Fox Doc"), "file:///fox.md")
            .await
            .unwrap();

        let hits = index.search("fox", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, chunk.id);
    }

    #[tokio::test]
    async fn search_malformed_query_returns_empty() {
        let pool = memory_pool().await;
        let index = Fts5LexicalIndex::new(pool);
        let hits = index.search("\"unterminated", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_doc_removes_all_its_chunks() {
        let pool = memory_pool().await;
        let index = Fts5LexicalIndex::new(pool);
        let doc_id = Uuid::new_v4();
        let chunks = vec![make_chunk(doc_id, 0, "alpha beta"), make_chunk(doc_id, 1, "gamma delta")];
        index.upsert_chunks(&chunks, None, "file:///x.md").await.unwrap();
        index.delete_doc(doc_id).await.unwrap();

        let hits = index.search("alpha", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_for_same_chunk_id() {
        let pool = memory_pool().await;
        let index = Fts5LexicalIndex::new(pool);
        let doc_id = Uuid::new_v4();
        let mut chunk = make_chunk(doc_id, 0, "first version text");
        index.upsert_chunks(&[chunk.clone()], None, "file:///y.md").await.unwrap();
        chunk.text = "second version text".to_string();
        index.upsert_chunks(&[chunk.clone()], None, "file:///y.md").await.unwrap();

        let hits = index.search("first", 10).await.unwrap();
        assert!(hits.is_empty());
        let hits = index.search("second", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
