//! JobRunner: a background poller that pulls pending [`Job`]s from
//! `MetadataStore` and drives them through `IndexingService`.
//!
//! Runs as a `tokio::task` rather than an OS thread, started and stopped
//! via an atomic flag checked between jobs and between poll cycles. Polls
//! every second, whether or not the last poll found work; the five-second
//! interval is reserved for backing off after a failed poll of the job
//! store itself.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::indexing::IndexingService;
use crate::metadata::MetadataStore;
use crate::models::{Job, JobStatus, JobType};

const BUSY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);
const BATCH_SIZE: i64 = 4;

pub struct JobRunner {
    metadata: Arc<dyn MetadataStore>,
    indexing: Arc<IndexingService>,
    stopped: AtomicBool,
}

impl JobRunner {
    pub fn new(metadata: Arc<dyn MetadataStore>, indexing: Arc<IndexingService>) -> Self {
        Self {
            metadata,
            indexing,
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawns the polling loop and returns its join handle.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn run(&self) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                info!("job runner stopped");
                return;
            }

            let pending = match self.metadata.get_pending_jobs(BATCH_SIZE).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to poll pending jobs");
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                    continue;
                }
            };

            if pending.is_empty() {
                tokio::time::sleep(BUSY_POLL_INTERVAL).await;
                continue;
            }

            for job in pending {
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                self.run_one(job).await;
            }

            tokio::time::sleep(BUSY_POLL_INTERVAL).await;
        }
    }

    async fn run_one(&self, mut job: Job) {
        job.status = JobStatus::Running;
        job.progress = 0.0;
        let job = match self.metadata.upsert_job(job).await {
            Ok(j) => j,
            Err(e) => {
                error!(error = %e, "failed to mark job running");
                return;
            }
        };

        let result = self.dispatch(&job).await;

        let mut finished = job;
        match result {
            Ok(()) => {
                finished.status = JobStatus::Done;
                finished.progress = 1.0;
                finished.error = None;
            }
            Err(e) => {
                warn!(job_id = %finished.id, error = %e, "job failed");
                finished.status = JobStatus::Failed;
                finished.error = Some(e.to_string());
            }
        }

        if let Err(e) = self.metadata.upsert_job(finished).await {
            error!(error = %e, "failed to persist job completion");
        }
    }

    async fn dispatch(&self, job: &Job) -> AppResult<()> {
        match job.job_type {
            JobType::ScanSource => {
                let source_id = payload_uuid(job, "source_id")?;
                let source = self
                    .metadata
                    .get_source(source_id)
                    .await?
                    .ok_or_else(|| crate::error::AppError::NotFound(format!("source {source_id}")))?;
                let is_bookmarks = source
                    .config
                    .get("is_bookmarks")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let root = PathBuf::from(&source.path);
                self.indexing.scan_source(source_id, &root, is_bookmarks).await?;
                Ok(())
            }
            JobType::IndexDoc => {
                let doc_id = payload_uuid(job, "doc_id")?;
                self.indexing.index_document(doc_id, Path::new(""), false).await?;
                Ok(())
            }
            JobType::ReindexAll => {
                for source in self.metadata.list_sources().await? {
                    let is_bookmarks = source
                        .config
                        .get("is_bookmarks")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let root = PathBuf::from(&source.path);
                    self.indexing.scan_source(source.id, &root, is_bookmarks).await?;
                }
                Ok(())
            }
        }
    }
}

/// Builds a `Job` in `pending` state for `source_id`'s next scan.
pub fn new_scan_source_job(source_id: Uuid) -> Job {
    Job::new_pending(JobType::ScanSource, json!({ "source_id": source_id }))
}

/// Builds a `Job` in `pending` state to reindex a single document.
pub fn new_index_doc_job(doc_id: Uuid) -> Job {
    Job::new_pending(JobType::IndexDoc, json!({ "doc_id": doc_id }))
}

/// Builds a `Job` in `pending` state to reindex every registered source.
pub fn new_reindex_all_job() -> Job {
    Job::new_pending(JobType::ReindexAll, json!({}))
}

fn payload_uuid(job: &Job, key: &str) -> AppResult<Uuid> {
    let raw = job
        .payload
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| crate::error::AppError::Validation(format!("job payload missing '{key}'")))?;
    Uuid::parse_str(raw).map_err(|e| crate::error::AppError::Validation(format!("invalid {key} in job payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_source_job_carries_source_id_in_payload() {
        let source_id = Uuid::new_v4();
        let job = new_scan_source_job(source_id);
        assert_eq!(job.job_type, JobType::ScanSource);
        assert_eq!(job.payload["source_id"], json!(source_id));
    }

    #[test]
    fn payload_uuid_rejects_missing_key() {
        let job = Job::new_pending(JobType::IndexDoc, json!({}));
        assert!(payload_uuid(&job, "doc_id").is_err());
    }

    #[test]
    fn payload_uuid_parses_valid_uuid_string() {
        let doc_id = Uuid::new_v4();
        let job = new_index_doc_job(doc_id);
        assert_eq!(payload_uuid(&job, "doc_id").unwrap(), doc_id);
    }
}
