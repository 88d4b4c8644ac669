//! Core data models for the ingestion and retrieval pipeline: Sources,
//! Documents, Chunks, and Jobs.
//!
//! Ownership: a Source owns Documents; a Document owns Chunks. Deleting a
//! Document's indexed presence means purging both the lexical and vector
//! stores before any re-upsert of its chunks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A registered input: a filesystem directory or a bookmarks-file path.
/// Never deleted by the core; mutated only via `upsert_source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub config: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub fn new(name: impl Into<String>, path: impl Into<String>, config: HashMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path: path.into(),
            config,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle status of a discovered Document. Transitions are driven
/// exclusively by `IndexingService`; `Deleted` is a tombstone, not a row
/// removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    New,
    Scanned,
    Changed,
    Indexed,
    Error,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::New => "new",
            DocumentStatus::Scanned => "scanned",
            DocumentStatus::Changed => "changed",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Error => "error",
            DocumentStatus::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(DocumentStatus::New),
            "scanned" => Ok(DocumentStatus::Scanned),
            "changed" => Ok(DocumentStatus::Changed),
            "indexed" => Ok(DocumentStatus::Indexed),
            "error" => Ok(DocumentStatus::Error),
            "deleted" => Ok(DocumentStatus::Deleted),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// A discovered unit of content within a Source. `uri` is its globally
/// unique identity (`file://…` or `https://…`); uniqueness is a
/// store-level invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source_id: Uuid,
    pub uri: String,
    pub title: Option<String>,
    pub mime_type: String,
    pub size_bytes: i64,
    pub mtime: DateTime<Utc>,
    pub doc_hash: Option<String>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new_candidate(
        source_id: Uuid,
        uri: impl Into<String>,
        title: Option<String>,
        mime_type: impl Into<String>,
        size_bytes: i64,
        mtime: DateTime<Utc>,
        status: DocumentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_id,
            uri: uri.into(),
            title,
            mime_type: mime_type.into(),
            size_bytes,
            mtime,
            doc_hash: None,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A contiguous token-window slice of a Document's extracted text.
/// `chunk_index` is dense and 0-based within a successfully indexed
/// document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub doc_id: Uuid,
    pub chunk_index: i64,
    pub text: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub chunk_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ScanSource,
    IndexDoc,
    ReindexAll,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ScanSource => "scan_source",
            JobType::IndexDoc => "index_doc",
            JobType::ReindexAll => "reindex_all",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan_source" => Ok(JobType::ScanSource),
            "index_doc" => Ok(JobType::IndexDoc),
            "reindex_all" => Ok(JobType::ReindexAll),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A unit of asynchronous work processed by the `JobRunner`. Created
/// `pending`; exactly one transition to `running`; terminal `done` or
/// `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: f64,
    pub error: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new_pending(job_type: JobType, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            progress: 0.0,
            error: None,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Output of a `ContentExtractor`: the extracted plain text plus whatever
/// title and auxiliary metadata the extractor could recover.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub text: String,
    pub title: Option<String>,
    pub mime_type: String,
    pub extra: HashMap<String, Value>,
}

/// A fully-hydrated search hit: a Chunk joined with its parent Document
/// and an RRF score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: Uuid,
    pub doc_id: Uuid,
    pub text: String,
    pub doc_title: Option<String>,
    pub doc_uri: String,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreBreakdown {
    pub lex_score: f64,
    pub lex_rank: Option<usize>,
    pub vec_score: f64,
    pub vec_rank: Option<usize>,
}
