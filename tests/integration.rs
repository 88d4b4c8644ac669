//! End-to-end tests driving the public library API the way the CLI and
//! HTTP server both do: build services from a `Config`, scan a Source,
//! and search the result.

use std::collections::HashMap;
use std::time::Duration;

use docweave::config::{
    BookmarksConfig, Config, EmbeddingConfig, IngestionConfig, LexicalBackend, MetadataBackend,
    RetrievalConfig, ServerConfig, StorageConfig, VectorBackend, WebFetchConfig,
};
use docweave::ingestion::IngestionService;
use docweave::jobs::{new_scan_source_job, JobRunner};
use docweave::models::{JobStatus, Source};
use docweave::server::build_services;
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let data_dir = tmp.path().join("data");
    Config {
        metadata_backend: MetadataBackend::Sqlite,
        lexical_backend: LexicalBackend::Fts5,
        vector_backend: VectorBackend::Faiss,
        storage: StorageConfig {
            sqlite_path: data_dir.join("docweave.sqlite"),
            faiss_dir: data_dir.join("vectors"),
            data_dir,
        },
        ingestion: IngestionConfig {
            chunk_size_tokens: 200,
            chunk_overlap_tokens: 20,
            max_file_mb: 20,
        },
        bookmarks: BookmarksConfig::default(),
        web_fetch: WebFetchConfig::default(),
        embedding: EmbeddingConfig {
            provider: "disabled".to_string(),
            model_name: "none".to_string(),
            dim: 8,
            timeout_secs: 60,
            max_retries: 5,
            api_base: None,
        },
        retrieval: RetrievalConfig::default(),
        server: ServerConfig::default(),
    }
}

/// A minimal single-page PDF pdf-extract/lopdf can both parse, containing
/// `phrase` as its only visible text.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(
        b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n",
    );
    let o4 = out.len();
    let stream = format!("BT /F1 12 Tf 100 700 Td ({phrase}) Tj ET\n");
    out.extend_from_slice(format!("4 0 obj << /Length {} >> stream\n{stream}endstream endobj\n", stream.len()).as_bytes());
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{xref_start}\n").as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn write_sample_tree(files_dir: &std::path::Path) {
    std::fs::create_dir_all(files_dir).unwrap();
    std::fs::write(
        files_dir.join("sample.md"),
        "# Sample Markdown\n\nThis document demonstrates markdown extraction and carries a Heading 1 as its title source.\n",
    )
    .unwrap();
    std::fs::write(
        files_dir.join("sample.html"),
        "<html><head><title>Sample HTML</title></head><body><p>An HTML sample document for extraction.</p></body></html>",
    )
    .unwrap();
    std::fs::write(files_dir.join("sample.pdf"), minimal_pdf_with_phrase("Hello PDF World")).unwrap();
}

#[tokio::test]
async fn register_scan_indexes_all_three_formats() {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    write_sample_tree(&files_dir);

    let config = test_config(&tmp);
    let (metadata, _lexical, _vector, _embedding, indexing, _search) = build_services(&config).await.unwrap();

    let source = metadata
        .upsert_source(Source::new("local", files_dir.to_string_lossy(), HashMap::new()))
        .await
        .unwrap();

    let indexed = indexing.scan_source(source.id, &files_dir, false).await.unwrap();
    assert_eq!(indexed, 3, "all three sample files should be indexed");

    let docs = metadata.list_documents_by_source(source.id).await.unwrap();
    assert_eq!(docs.len(), 3);
    for doc in &docs {
        assert_eq!(doc.status, docweave::models::DocumentStatus::Indexed);
        let chunks = metadata.list_chunks(doc.id).await.unwrap();
        assert!(!chunks.is_empty(), "document {} should have at least one chunk", doc.uri);
    }
}

#[tokio::test]
async fn search_markdown_surfaces_title_and_positive_lex_score() {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    write_sample_tree(&files_dir);

    let config = test_config(&tmp);
    let (metadata, _lexical, _vector, _embedding, indexing, search) = build_services(&config).await.unwrap();

    let source = metadata
        .upsert_source(Source::new("local", files_dir.to_string_lossy(), HashMap::new()))
        .await
        .unwrap();
    indexing.scan_source(source.id, &files_dir, false).await.unwrap();

    let results = search.search("markdown", 20, 20, 5).await.unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].doc_title.as_deref(), Some("Sample Markdown"));
    assert!(results[0].score_breakdown.lex_score > 0.0);
}

#[tokio::test]
async fn search_for_absent_term_returns_no_results() {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    write_sample_tree(&files_dir);

    let config = test_config(&tmp);
    let (metadata, _lexical, _vector, _embedding, indexing, search) = build_services(&config).await.unwrap();

    let source = metadata
        .upsert_source(Source::new("local", files_dir.to_string_lossy(), HashMap::new()))
        .await
        .unwrap();
    indexing.scan_source(source.id, &files_dir, false).await.unwrap();

    // Embeddings are disabled in this config, so a term present in no
    // document yields empty lexical and vector rankings, and therefore an
    // empty fused result.
    let results = search.search("unlikelykeywordxyz", 20, 20, 5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn rescan_after_content_change_replaces_chunks_without_duplicating_documents() {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    write_sample_tree(&files_dir);

    let config = test_config(&tmp);
    let (metadata, _lexical, _vector, _embedding, indexing, search) = build_services(&config).await.unwrap();

    let source = metadata
        .upsert_source(Source::new("local", files_dir.to_string_lossy(), HashMap::new()))
        .await
        .unwrap();
    indexing.scan_source(source.id, &files_dir, false).await.unwrap();
    assert_eq!(metadata.list_documents_by_source(source.id).await.unwrap().len(), 3);

    // mtime resolution on most filesystems is 1 second; wait so the
    // rewritten file gets a strictly later mtime, matching how a real
    // editor save would look to a re-scan.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(
        files_dir.join("sample.md"),
        "# Sample Markdown\n\nRevised body mentioning gravitonsynthesis as its sole unique keyword.\n",
    )
    .unwrap();

    indexing.scan_source(source.id, &files_dir, false).await.unwrap();

    let docs = metadata.list_documents_by_source(source.id).await.unwrap();
    assert_eq!(docs.len(), 3, "re-scanning an existing file must not create a duplicate Document");

    let md_doc = docs.iter().find(|d| d.uri.ends_with("sample.md")).unwrap();
    let chunks = metadata.list_chunks(md_doc.id).await.unwrap();
    assert_eq!(chunks.len(), 1, "chunk rows must be replaced, not accumulated, across re-indexes");

    let results = search.search("gravitonsynthesis", 20, 20, 5).await.unwrap();
    assert_eq!(results.len(), 1, "revised content should be searchable under its new title");
    assert_eq!(results[0].doc_title.as_deref(), Some("Sample Markdown"));
}

#[tokio::test]
async fn rescan_with_no_filesystem_changes_skips_extraction_entirely() {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    write_sample_tree(&files_dir);

    let config = test_config(&tmp);
    let (metadata, _lexical, _vector, _embedding, indexing, _search) = build_services(&config).await.unwrap();

    let source = metadata
        .upsert_source(Source::new("local", files_dir.to_string_lossy(), HashMap::new()))
        .await
        .unwrap();

    let first_indexed = indexing.scan_source(source.id, &files_dir, false).await.unwrap();
    assert_eq!(first_indexed, 3);

    let md_doc_before = metadata
        .list_documents_by_source(source.id)
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.uri.ends_with("sample.md"))
        .unwrap();
    let chunks_before = metadata.list_chunks(md_doc_before.id).await.unwrap();

    // Nothing on disk changed, so mtime/size_bytes diffing must classify
    // every candidate as unchanged and skip it before extraction ever
    // runs: the re-scan reports zero newly indexed documents, and the
    // chunk rows (and their ids) are left exactly as they were.
    let second_indexed = indexing.scan_source(source.id, &files_dir, false).await.unwrap();
    assert_eq!(second_indexed, 0, "an unchanged re-scan should index nothing");

    let md_doc_after = metadata.get_document(md_doc_before.id).await.unwrap().unwrap();
    assert_eq!(md_doc_after.status, docweave::models::DocumentStatus::Indexed);

    let chunks_after = metadata.list_chunks(md_doc_before.id).await.unwrap();
    assert_eq!(chunks_before.len(), chunks_after.len());
    for (before, after) in chunks_before.iter().zip(chunks_after.iter()) {
        assert_eq!(before.id, after.id, "unchanged documents must not have their chunk rows replaced");
    }
}

#[tokio::test]
async fn bookmarks_source_yields_two_html_candidates() {
    let tmp = TempDir::new().unwrap();
    let bookmarks_path = tmp.path().join("Bookmarks");
    std::fs::write(
        &bookmarks_path,
        r#"{
            "roots": {
                "bookmark_bar": {
                    "type": "folder",
                    "children": [
                        {"type": "url", "name": "Google", "url": "https://www.google.com/"},
                        {"type": "url", "name": "Example", "url": "https://example.com/"}
                    ]
                }
            }
        }"#,
    )
    .unwrap();

    let source_id = uuid::Uuid::new_v4();
    let candidates = IngestionService::scan_bookmarks(source_id, &bookmarks_path).unwrap();

    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|d| d.mime_type == "text/html"));
    let uris: Vec<&str> = candidates.iter().map(|d| d.uri.as_str()).collect();
    assert!(uris.contains(&"https://www.google.com/"));
    assert!(uris.contains(&"https://example.com/"));
}

#[tokio::test]
async fn job_runner_drains_scan_job_to_done() {
    let tmp = TempDir::new().unwrap();
    let files_dir = tmp.path().join("files");
    write_sample_tree(&files_dir);

    let config = test_config(&tmp);
    let (metadata, _lexical, _vector, _embedding, indexing, _search) = build_services(&config).await.unwrap();

    let source = metadata
        .upsert_source(Source::new("local", files_dir.to_string_lossy(), HashMap::new()))
        .await
        .unwrap();

    let job = metadata.upsert_job(new_scan_source_job(source.id)).await.unwrap();

    let runner = std::sync::Arc::new(JobRunner::new(metadata.clone(), indexing));
    let handle = runner.clone().start();

    let mut finished = None;
    for _ in 0..100 {
        let current = metadata.get_job(job.id).await.unwrap().unwrap();
        if current.status == JobStatus::Done || current.status == JobStatus::Failed {
            finished = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    runner.stop();
    handle.abort();

    let finished = finished.expect("job should have reached a terminal state within the polling window");
    assert_eq!(finished.status, JobStatus::Done);
    assert_eq!(finished.progress, 1.0);
}
