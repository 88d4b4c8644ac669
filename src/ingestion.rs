//! IngestionService: turns a Source's external location into a list of
//! candidate [`Document`]s, without touching storage.
//!
//! `scan_directory` walks a filesystem root (dotfiles skipped); `scan_bookmarks`
//! walks a Chrome `Bookmarks` JSON file. Both classify each candidate's MIME
//! type from its filename/URI, deferring the new/changed/unchanged decision
//! to `IndexingService::scan_source`.

use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{AppError, AppResult};
use crate::models::{Document, DocumentStatus};

/// Infers a MIME type from a file extension.
fn guess_mime(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "pdf" => "application/pdf",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

pub struct IngestionService;

impl IngestionService {
    /// Recursively walks `root`, skipping dotfiles and dot-directories, and
    /// returns one candidate [`Document`] per regular file found.
    pub fn scan_directory(source_id: Uuid, root: &Path) -> AppResult<Vec<Document>> {
        if !root.exists() {
            return Err(AppError::Validation(format!(
                "ingestion root does not exist: {}",
                root.display()
            )));
        }

        let mut candidates = Vec::new();

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_dotfile(e.file_name().to_str().unwrap_or("")))
        {
            let entry = entry.map_err(|e| AppError::Internal(format!("directory walk failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let metadata = std::fs::metadata(path)?;
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let uri = format!("file://{}", path.display());
            let title = path.file_name().map(|n| n.to_string_lossy().to_string());
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
                .unwrap_or_else(Utc::now);

            candidates.push(Document::new_candidate(
                source_id,
                uri,
                title,
                guess_mime(ext),
                metadata.len() as i64,
                mtime,
                DocumentStatus::New,
            ));
        }

        candidates.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(candidates)
    }

    /// Parses a Chrome `Bookmarks` JSON file and returns one candidate
    /// [`Document`] per bookmark URL leaf node.
    pub fn scan_bookmarks(source_id: Uuid, bookmarks_path: &Path) -> AppResult<Vec<Document>> {
        let content = std::fs::read_to_string(bookmarks_path)?;
        let root: Value = serde_json::from_str(&content)
            .map_err(|e| AppError::Validation(format!("invalid bookmarks JSON: {e}")))?;

        let mut candidates = Vec::new();
        if let Some(roots) = root.get("roots").and_then(|r| r.as_object()) {
            for (_name, node) in roots {
                walk_bookmark_node(source_id, node, &mut candidates);
            }
        }
        candidates.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(candidates)
    }
}

fn is_dotfile(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

fn walk_bookmark_node(source_id: Uuid, node: &Value, out: &mut Vec<Document>) {
    match node.get("type").and_then(|t| t.as_str()) {
        Some("url") => {
            let Some(url) = node.get("url").and_then(|u| u.as_str()) else { return };
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return;
            }
            let title = node.get("name").and_then(|n| n.as_str()).map(|s| s.to_string());
            out.push(Document::new_candidate(
                source_id,
                url.to_string(),
                title,
                "text/html",
                0,
                Utc::now(),
                DocumentStatus::New,
            ));
        }
        Some("folder") => {
            if let Some(children) = node.get("children").and_then(|c| c.as_array()) {
                for child in children {
                    walk_bookmark_node(source_id, child, out);
                }
            }
        }
        _ => {}
    }
}
