//! # docweave
//!
//! A local-first hybrid document search engine: point it at filesystem
//! directories or a browser bookmarks file, and it ingests, chunks,
//! embeds, and indexes their content for keyword, semantic, and fused
//! hybrid retrieval.
//!
//! ## Architecture
//!
//! ```text
//! Sources → Ingestion (scan) → Indexing (extract/chunk/embed) → SQLite (FTS5 + vectors) → Search (RRF) → CLI / HTTP
//! ```
//!
//! ## Data model
//!
//! A [`models::Source`] owns [`models::Document`]s; a Document owns
//! [`models::Chunk`]s. [`models::Job`]s are queued work items the
//! background [`jobs::JobRunner`] drains.
//!
//! ## Modules
//!
//! - [`config`] — YAML configuration parsing, validation, env overrides
//! - [`error`] — domain error taxonomy shared by every port
//! - [`models`] — Source, Document, Chunk, Job, SearchResult
//! - [`db`] — SQLite connection pool bootstrap
//! - [`migrate`] — idempotent schema migrations
//! - [`metadata`] — durable storage port + SQLite implementation
//! - [`lexical`] — keyword search port + FTS5 implementation
//! - [`vector`] — vector similarity port + flat in-memory implementation
//! - [`embedding`] — embedding provider port, OpenAI-compatible client, disk cache
//! - [`extract`] — content extraction (HTML, Markdown, PDF, Google Docs)
//! - [`chunk`] — BPE sliding-window chunker
//! - [`ingestion`] — turns a Source's location into candidate Documents
//! - [`indexing`] — extract → chunk → embed → index pipeline
//! - [`jobs`] — background job queue runner
//! - [`search`] — hybrid lexical+vector search fused with RRF
//! - [`server`] — HTTP API (Axum)

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexing;
pub mod ingestion;
pub mod jobs;
pub mod lexical;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod vector;
