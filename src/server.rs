//! HTTP API.
//!
//! Exposes source registration, on-demand scanning, job status, document
//! browsing, and hybrid search over a JSON HTTP interface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sources` | Register a new Source |
//! | `GET`  | `/sources` | List all Sources |
//! | `POST` | `/sources/{id}/scan` | Enqueue a scan job for a Source |
//! | `GET`  | `/jobs` | List all Jobs |
//! | `GET`  | `/jobs/{id}` | Get a Job by id |
//! | `GET`  | `/documents?source_id=` | List Documents for a Source |
//! | `GET`  | `/documents/{id}` | Get a Document by id |
//! | `GET`  | `/documents/{id}/chunks` | List a Document's Chunks |
//! | `POST` | `/search` | Hybrid lexical+vector search |
//! | `GET`  | `/health` | Health check |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: this is a local tool
//! meant to be reachable from browser-based clients without a proxy.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::embedding::cache::{cache_dir_for, EmbeddingCache};
use crate::embedding::{EmbeddingProvider, RemoteEmbeddingProvider};
use crate::error::{AppError, AppResult};
use crate::indexing::IndexingService;
use crate::jobs::{new_scan_source_job, JobRunner};
use crate::lexical::{Fts5LexicalIndex, LexicalIndex};
use crate::metadata::{MetadataStore, SqliteMetadataStore};
use crate::migrate::run_migrations;
use crate::models::{Chunk, Document, Job, Source};
use crate::search::SearchService;
use crate::vector::{FlatVectorStore, VectorStore};

#[derive(Clone)]
struct AppState {
    metadata: Arc<dyn MetadataStore>,
    search: Arc<SearchService>,
    retrieval: crate::config::RetrievalConfig,
}

/// Builds every storage/service layer from `config` and returns the
/// shared pieces `run_server` and the CLI's non-HTTP commands both need.
pub async fn build_services(
    config: &Config,
) -> AppResult<(
    Arc<dyn MetadataStore>,
    Arc<dyn LexicalIndex>,
    Arc<dyn VectorStore>,
    Option<Arc<dyn EmbeddingProvider>>,
    Arc<IndexingService>,
    Arc<SearchService>,
)> {
    run_migrations(config).await.map_err(|e| AppError::Internal(e.to_string()))?;
    let pool = db::connect(config).await.map_err(|e| AppError::Internal(e.to_string()))?;

    let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(pool.clone()));
    let lexical: Arc<dyn LexicalIndex> = Arc::new(Fts5LexicalIndex::new(pool.clone()));
    let vector: Arc<dyn VectorStore> = Arc::new(FlatVectorStore::open(pool, &config.storage.faiss_dir)?);

    let embedding: Option<Arc<dyn EmbeddingProvider>> = if config.embedding.is_enabled() {
        Some(Arc::new(RemoteEmbeddingProvider::new(&config.embedding)?))
    } else {
        None
    };

    let embedding_cache = if embedding.is_some() {
        Some(Arc::new(EmbeddingCache::open(cache_dir_for(&config.storage.data_dir))?))
    } else {
        None
    };

    let indexing = Arc::new(IndexingService::new(
        metadata.clone(),
        lexical.clone(),
        vector.clone(),
        embedding.clone(),
        embedding_cache,
        config.clone(),
    ));

    let search = Arc::new(SearchService::new(
        metadata.clone(),
        lexical.clone(),
        vector.clone(),
        embedding.clone(),
        config.retrieval.rrf_k,
    ));

    Ok((metadata, lexical, vector, embedding, indexing, search))
}

/// Starts the HTTP server. Binds to `[server].bind`, runs migrations, and
/// starts the background `JobRunner` alongside the Axum listener. Runs
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let (metadata, _lexical, _vector, _embedding, indexing, search) = build_services(config).await?;

    let runner = Arc::new(JobRunner::new(metadata.clone(), indexing));
    runner.start();

    let state = AppState {
        metadata,
        search,
        retrieval: config.retrieval.clone(),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/sources", post(handle_create_source).get(handle_list_sources))
        .route("/sources/{id}/scan", post(handle_scan_source))
        .route("/jobs", get(handle_list_jobs))
        .route("/jobs/{id}", get(handle_get_job))
        .route("/documents", get(handle_list_documents))
        .route("/documents/{id}", get(handle_get_document))
        .route("/documents/{id}/chunks", get(handle_list_chunks))
        .route("/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %config.server.bind, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ POST /sources, GET /sources ============

#[derive(Deserialize)]
struct CreateSourceRequest {
    name: String,
    path: String,
    #[serde(default)]
    is_bookmarks: bool,
}

async fn handle_create_source(
    State(state): State<AppState>,
    Json(req): Json<CreateSourceRequest>,
) -> Result<Json<Source>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    let mut config = std::collections::HashMap::new();
    config.insert("is_bookmarks".to_string(), serde_json::json!(req.is_bookmarks));
    let source = Source::new(req.name, req.path, config);
    let source = state.metadata.upsert_source(source).await?;
    Ok(Json(source))
}

async fn handle_list_sources(State(state): State<AppState>) -> Result<Json<Vec<Source>>, AppError> {
    Ok(Json(state.metadata.list_sources().await?))
}

// ============ POST /sources/{id}/scan ============

async fn handle_scan_source(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<Job>, AppError> {
    state
        .metadata
        .get_source(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("source {id}")))?;

    let job = state.metadata.upsert_job(new_scan_source_job(id)).await?;
    Ok(Json(job))
}

// ============ GET /jobs, GET /jobs/{id} ============

async fn handle_list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, AppError> {
    Ok(Json(state.metadata.list_jobs().await?))
}

async fn handle_get_job(State(state): State<AppState>, AxumPath(id): AxumPath<Uuid>) -> Result<Json<Job>, AppError> {
    let job = state.metadata.get_job(id).await?.ok_or_else(|| AppError::NotFound(format!("job {id}")))?;
    Ok(Json(job))
}

// ============ GET /documents, GET /documents/{id}, GET /documents/{id}/chunks ============

#[derive(Deserialize)]
struct ListDocumentsQuery {
    source_id: Uuid,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Query(q): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<Document>>, AppError> {
    Ok(Json(state.metadata.list_documents_by_source(q.source_id).await?))
}

async fn handle_get_document(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<Document>, AppError> {
    let doc = state.metadata.get_document(id).await?.ok_or_else(|| AppError::NotFound(format!("document {id}")))?;
    Ok(Json(doc))
}

async fn handle_list_chunks(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<Vec<Chunk>>, AppError> {
    Ok(Json(state.metadata.list_chunks(id).await?))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<crate::models::SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::Validation("query must not be empty".to_string()));
    }
    let limit = req.limit.unwrap_or(state.retrieval.top_k_lex.max(state.retrieval.top_k_vec));
    let results = state
        .search
        .search(&req.query, state.retrieval.top_k_lex, state.retrieval.top_k_vec, limit)
        .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
