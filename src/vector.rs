//! VectorStore: similarity index over chunk embeddings.
//!
//! The GLOSSARY calls this "ANN… configured as exact inner-product over
//! L2-normalized vectors" — so the default backend here is a flat,
//! brute-force inner-product scan rather than a true approximate index
//! (see `DESIGN.md`, §4.3 open-question resolution). Integer vector ids
//! are mapped to chunk/doc identity through a sidecar table that also
//! carries the soft-delete flag; the in-memory vector set is snapshotted
//! to disk after every successful `upsert_embeddings` via an atomic
//! write-temp-then-rename, and reloaded from that snapshot plus the
//! sidecar on startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Chunk;

const OVERSAMPLE_FACTOR: i64 = 5;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_embeddings(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> AppResult<()>;
    async fn delete_doc(&self, doc_id: Uuid) -> AppResult<()>;
    /// Returns `(chunk_id, score)` pairs, higher score (cosine similarity)
    /// first.
    async fn query(&self, vector: &[f32], top_k: i64) -> AppResult<Vec<(Uuid, f64)>>;
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    vectors: HashMap<i64, Vec<f32>>,
    next_id: i64,
}

pub struct FlatVectorStore {
    pool: SqlitePool,
    snapshot_path: PathBuf,
    state: RwLock<Snapshot>,
}

impl FlatVectorStore {
    /// Loads the on-disk snapshot (if present) and opens against the
    /// sidecar table in `pool`. Dangling sidecar rows without a
    /// corresponding snapshot vector (a crash between writes) are simply
    /// filtered out at query time by the join against `vectors`.
    pub fn open(pool: SqlitePool, faiss_dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(faiss_dir)?;
        let snapshot_path = faiss_dir.join("index.faiss");
        let state = if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path)?;
            bincode::deserialize(&bytes)
                .map_err(|e| AppError::Internal(format!("corrupt vector snapshot: {e}")))?
        } else {
            Snapshot::default()
        };
        Ok(Self {
            pool,
            snapshot_path,
            state: RwLock::new(state),
        })
    }

    fn persist(&self) -> AppResult<()> {
        let state = self.state.read().expect("vector store lock poisoned");
        let bytes = bincode::serialize(&*state)
            .map_err(|e| AppError::Internal(format!("failed to serialize vector snapshot: {e}")))?;
        let tmp_path = self.snapshot_path.with_extension("faiss.tmp");
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &self.snapshot_path)?;
        Ok(())
    }

    fn normalize(vector: &[f32]) -> Vec<f32> {
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return vector.to_vec();
        }
        vector.iter().map(|v| v / norm).collect()
    }

    fn inner_product(a: &[f32], b: &[f32]) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
    }
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn upsert_embeddings(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> AppResult<()> {
        if chunks.len() != embeddings.len() {
            return Err(AppError::Internal(
                "chunks and embeddings length mismatch".to_string(),
            ));
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut fresh_ids: Vec<(i64, Vec<f32>)> = Vec::with_capacity(chunks.len());

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            // (a) mark every prior row with the same chunk_id as deleted.
            sqlx::query("UPDATE vector_sidecar SET deleted = 1 WHERE chunk_id = ?")
                .bind(chunk.id.to_string())
                .execute(&mut *tx)
                .await?;

            let vector_id = {
                let mut state = self.state.write().expect("vector store lock poisoned");
                let id = state.next_id;
                state.next_id += 1;
                id
            };

            // (b) insert a fresh mapping row with deleted=false.
            sqlx::query(
                "INSERT INTO vector_sidecar (vector_id, chunk_id, doc_id, deleted) VALUES (?, ?, ?, 0)",
            )
            .bind(vector_id)
            .bind(chunk.id.to_string())
            .bind(chunk.doc_id.to_string())
            .execute(&mut *tx)
            .await?;

            fresh_ids.push((vector_id, Self::normalize(embedding)));
        }

        tx.commit().await?;

        {
            let mut state = self.state.write().expect("vector store lock poisoned");
            for (id, vec) in fresh_ids {
                state.vectors.insert(id, vec);
            }
        }

        // (c) persist the snapshot after every successful upsert.
        self.persist()?;
        Ok(())
    }

    async fn delete_doc(&self, doc_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE vector_sidecar SET deleted = 1 WHERE doc_id = ?")
            .bind(doc_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: i64) -> AppResult<Vec<(Uuid, f64)>> {
        if top_k <= 0 {
            return Ok(Vec::new());
        }
        let query_vec = Self::normalize(vector);
        let oversampled_k = (top_k * OVERSAMPLE_FACTOR) as usize;

        let mut scored: Vec<(i64, f64)> = {
            let state = self.state.read().expect("vector store lock poisoned");
            state
                .vectors
                .iter()
                .map(|(id, v)| (*id, Self::inner_product(&query_vec, v)))
                .collect()
        };
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(oversampled_k);

        if scored.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = scored.iter().map(|(id, _)| *id).collect();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT vector_id, chunk_id FROM vector_sidecar WHERE vector_id IN ({placeholders}) AND deleted = 0"
        );
        let mut q = sqlx::query(&sql);
        for id in &ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut live: HashMap<i64, Uuid> = HashMap::new();
        for row in &rows {
            let vector_id: i64 = row.try_get("vector_id")?;
            let chunk_id_str: String = row.try_get("chunk_id")?;
            if let Ok(chunk_id) = Uuid::parse_str(&chunk_id_str) {
                live.insert(vector_id, chunk_id);
            }
        }

        let mut results = Vec::with_capacity(top_k as usize);
        for (id, score) in scored {
            if let Some(chunk_id) = live.get(&id) {
                results.push((*chunk_id, score));
                if results.len() == top_k as usize {
                    break;
                }
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
            r#"
            CREATE TABLE vector_sidecar (
                vector_id INTEGER PRIMARY KEY,
                chunk_id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn make_chunk(doc_id: Uuid, idx: i64) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            doc_id,
            chunk_index: idx,
            text: format!("chunk {idx}"),
            start_offset: 0,
            end_offset: 10,
            chunk_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn query_returns_most_similar_vector_first() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let store = FlatVectorStore::open(pool, dir.path()).unwrap();
        let doc_id = Uuid::new_v4();
        let a = make_chunk(doc_id, 0);
        let b = make_chunk(doc_id, 1);

        store
            .upsert_embeddings(&[a.clone(), b.clone()], &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].0, a.id);
    }

    #[tokio::test]
    async fn delete_doc_filters_out_its_chunks() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let store = FlatVectorStore::open(pool, dir.path()).unwrap();
        let doc_id = Uuid::new_v4();
        let a = make_chunk(doc_id, 0);

        store.upsert_embeddings(&[a.clone()], &[vec![1.0, 0.0]]).await.unwrap();
        store.delete_doc(doc_id).await.unwrap();

        let hits = store.query(&[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn reupsert_soft_deletes_prior_mapping() {
        let pool = memory_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let store = FlatVectorStore::open(pool, dir.path()).unwrap();
        let doc_id = Uuid::new_v4();
        let mut a = make_chunk(doc_id, 0);

        store.upsert_embeddings(&[a.clone()], &[vec![1.0, 0.0]]).await.unwrap();
        a.text = "updated".to_string();
        store.upsert_embeddings(&[a.clone()], &[vec![0.0, 1.0]]).await.unwrap();

        let hits = store.query(&[1.0, 0.0], 5).await.unwrap();
        // Only the fresh mapping (now pointing at [0,1]) should be live.
        assert_eq!(hits.len(), 1);
        assert!(hits[0].1 < 0.5);
    }
}
