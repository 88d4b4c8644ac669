//! MetadataStore: durable storage for Sources, Documents, Chunks, and Jobs.
//!
//! All writes are upsert semantics — if `id` exists, fields are
//! overwritten and `updated_at` refreshed; otherwise a row is inserted.
//! The default backend is a single SQLite file; `documents.uri` carries a
//! UNIQUE constraint enforced by the schema.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Chunk, Document, DocumentStatus, Job, JobStatus, JobType, Source};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn upsert_source(&self, source: Source) -> AppResult<Source>;
    async fn get_source(&self, id: Uuid) -> AppResult<Option<Source>>;
    async fn list_sources(&self) -> AppResult<Vec<Source>>;

    async fn upsert_document(&self, doc: Document) -> AppResult<Document>;
    async fn get_document(&self, id: Uuid) -> AppResult<Option<Document>>;
    async fn list_documents_by_source(&self, source_id: Uuid) -> AppResult<Vec<Document>>;
    async fn mark_document_deleted(&self, id: Uuid) -> AppResult<()>;

    async fn upsert_chunk(&self, chunk: Chunk) -> AppResult<Chunk>;
    async fn list_chunks(&self, doc_id: Uuid) -> AppResult<Vec<Chunk>>;
    async fn get_chunk(&self, id: Uuid) -> AppResult<Option<Chunk>>;
    /// Removes every chunk row belonging to `doc_id`. Called by
    /// `IndexingService` before re-inserting fresh chunks so orphan rows
    /// never accumulate across re-indexes.
    async fn delete_chunks(&self, doc_id: Uuid) -> AppResult<()>;

    async fn upsert_job(&self, job: Job) -> AppResult<Job>;
    async fn get_job(&self, id: Uuid) -> AppResult<Option<Job>>;
    async fn list_jobs(&self) -> AppResult<Vec<Job>>;
    /// Jobs with `status = 'pending'` in FIFO order by `created_at`, up to
    /// `limit`.
    async fn get_pending_jobs(&self, limit: i64) -> AppResult<Vec<Job>>;
}

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> AppResult<Source> {
    let config_json: String = row.try_get("config_json").map_err(AppError::from)?;
    let config: HashMap<String, Value> =
        serde_json::from_str(&config_json).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Source {
        id: parse_uuid(row.try_get("id").map_err(AppError::from)?)?,
        name: row.try_get("name").map_err(AppError::from)?,
        path: row.try_get("path").map_err(AppError::from)?,
        config,
        created_at: parse_ts(row.try_get("created_at").map_err(AppError::from)?)?,
        updated_at: parse_ts(row.try_get("updated_at").map_err(AppError::from)?)?,
    })
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> AppResult<Document> {
    let status_str: String = row.try_get("status").map_err(AppError::from)?;
    let status = DocumentStatus::from_str(&status_str).map_err(AppError::Internal)?;
    Ok(Document {
        id: parse_uuid(row.try_get("id").map_err(AppError::from)?)?,
        source_id: parse_uuid(row.try_get("source_id").map_err(AppError::from)?)?,
        uri: row.try_get("uri").map_err(AppError::from)?,
        title: row.try_get("title").map_err(AppError::from)?,
        mime_type: row.try_get("mime_type").map_err(AppError::from)?,
        size_bytes: row.try_get("size_bytes").map_err(AppError::from)?,
        mtime: parse_ts(row.try_get("mtime").map_err(AppError::from)?)?,
        doc_hash: row.try_get("doc_hash").map_err(AppError::from)?,
        status,
        created_at: parse_ts(row.try_get("created_at").map_err(AppError::from)?)?,
        updated_at: parse_ts(row.try_get("updated_at").map_err(AppError::from)?)?,
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> AppResult<Chunk> {
    Ok(Chunk {
        id: parse_uuid(row.try_get("id").map_err(AppError::from)?)?,
        doc_id: parse_uuid(row.try_get("doc_id").map_err(AppError::from)?)?,
        chunk_index: row.try_get("chunk_index").map_err(AppError::from)?,
        text: row.try_get("text").map_err(AppError::from)?,
        start_offset: row.try_get("start_offset").map_err(AppError::from)?,
        end_offset: row.try_get("end_offset").map_err(AppError::from)?,
        chunk_hash: row.try_get("chunk_hash").map_err(AppError::from)?,
    })
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> AppResult<Job> {
    let job_type_str: String = row.try_get("job_type").map_err(AppError::from)?;
    let status_str: String = row.try_get("status").map_err(AppError::from)?;
    let payload_json: String = row.try_get("payload_json").map_err(AppError::from)?;
    Ok(Job {
        id: parse_uuid(row.try_get("id").map_err(AppError::from)?)?,
        job_type: JobType::from_str(&job_type_str).map_err(AppError::Internal)?,
        status: JobStatus::from_str(&status_str).map_err(AppError::Internal)?,
        progress: row.try_get("progress").map_err(AppError::from)?,
        error: row.try_get("error").map_err(AppError::from)?,
        payload: serde_json::from_str(&payload_json).map_err(|e| AppError::Internal(e.to_string()))?,
        created_at: parse_ts(row.try_get("created_at").map_err(AppError::from)?)?,
        updated_at: parse_ts(row.try_get("updated_at").map_err(AppError::from)?)?,
    })
}

fn parse_uuid(s: String) -> AppResult<Uuid> {
    Uuid::parse_str(&s).map_err(|e| AppError::Internal(format!("invalid uuid '{s}': {e}")))
}

fn parse_ts(s: String) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("invalid timestamp '{s}': {e}")))
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn upsert_source(&self, mut source: Source) -> AppResult<Source> {
        source.updated_at = Utc::now();
        let config_json =
            serde_json::to_string(&source.config).map_err(|e| AppError::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, path, config_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                path = excluded.path,
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source.id.to_string())
        .bind(&source.name)
        .bind(&source.path)
        .bind(config_json)
        .bind(source.created_at.to_rfc3339())
        .bind(source.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(source)
    }

    async fn get_source(&self, id: Uuid) -> AppResult<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn list_sources(&self) -> AppResult<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;
        rows.iter().map(row_to_source).collect()
    }

    async fn upsert_document(&self, mut doc: Document) -> AppResult<Document> {
        doc.updated_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO documents (id, source_id, uri, title, mime_type, size_bytes, mtime, doc_hash, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                mime_type = excluded.mime_type,
                size_bytes = excluded.size_bytes,
                mtime = excluded.mtime,
                doc_hash = excluded.doc_hash,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(doc.id.to_string())
        .bind(doc.source_id.to_string())
        .bind(&doc.uri)
        .bind(&doc.title)
        .bind(&doc.mime_type)
        .bind(doc.size_bytes)
        .bind(doc.mtime.to_rfc3339())
        .bind(&doc.doc_hash)
        .bind(doc.status.as_str())
        .bind(doc.created_at.to_rfc3339())
        .bind(doc.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("document uri already registered: {}", doc.uri))
            }
            other => AppError::from(other),
        })?;
        Ok(doc)
    }

    async fn get_document(&self, id: Uuid) -> AppResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents_by_source(&self, source_id: Uuid) -> AppResult<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE source_id = ? ORDER BY uri ASC")
            .bind(source_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;
        rows.iter().map(row_to_document).collect()
    }

    async fn mark_document_deleted(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE documents SET status = 'deleted', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: Chunk) -> AppResult<Chunk> {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, doc_id, chunk_index, text, start_offset, end_offset, chunk_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                start_offset = excluded.start_offset,
                end_offset = excluded.end_offset,
                chunk_hash = excluded.chunk_hash
            "#,
        )
        .bind(chunk.id.to_string())
        .bind(chunk.doc_id.to_string())
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.start_offset)
        .bind(chunk.end_offset)
        .bind(&chunk.chunk_hash)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(chunk)
    }

    async fn list_chunks(&self, doc_id: Uuid) -> AppResult<Vec<Chunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE doc_id = ? ORDER BY chunk_index ASC")
            .bind(doc_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn get_chunk(&self, id: Uuid) -> AppResult<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        row.as_ref().map(row_to_chunk).transpose()
    }

    async fn delete_chunks(&self, doc_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(doc_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn upsert_job(&self, mut job: Job) -> AppResult<Job> {
        job.updated_at = Utc::now();
        let payload_json =
            serde_json::to_string(&job.payload).map_err(|e| AppError::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, status, progress, error, payload_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.progress)
        .bind(&job.error)
        .bind(payload_json)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> AppResult<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;
        rows.iter().map(row_to_job).collect()
    }

    async fn get_pending_jobs(&self, limit: i64) -> AppResult<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        rows.iter().map(row_to_job).collect()
    }
}
