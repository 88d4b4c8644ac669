//! IndexingService: diffs scanned candidates against stored Documents and
//! drives the extract → chunk → embed → index pipeline for each one that
//! needs it.
//!
//! `scan_source` classifies every candidate as new/changed/unchanged by
//! comparing `mtime`/`size_bytes` against the stored Document — unchanged
//! candidates are skipped before any content is read — then indexes each
//! new-or-changed document, bounded by a semaphore so a large source can't
//! spawn unbounded concurrent extraction/embedding work. `index_document`
//! always purges a document's prior chunk rows before writing fresh ones,
//! so orphan rows never accumulate across re-indexes.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::cache::EmbeddingCache;
use crate::embedding::EmbeddingProvider;
use crate::error::AppResult;
use crate::extract::{self, ContentExtractor};
use crate::ingestion::IngestionService;
use crate::lexical::LexicalIndex;
use crate::metadata::MetadataStore;
use crate::models::{Document, DocumentStatus};
use crate::vector::VectorStore;

pub struct IndexingService {
    metadata: Arc<dyn MetadataStore>,
    lexical: Arc<dyn LexicalIndex>,
    vector: Arc<dyn VectorStore>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    embedding_cache: Option<Arc<EmbeddingCache>>,
    config: Config,
    semaphore: Arc<Semaphore>,
}

impl IndexingService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        lexical: Arc<dyn LexicalIndex>,
        vector: Arc<dyn VectorStore>,
        embedding: Option<Arc<dyn EmbeddingProvider>>,
        embedding_cache: Option<Arc<EmbeddingCache>>,
        config: Config,
    ) -> Self {
        let permits = config.retrieval.indexing_concurrency;
        Self {
            metadata,
            lexical,
            vector,
            embedding,
            embedding_cache,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Scans `source`'s location, diffs the result against stored
    /// Documents, and indexes every new or changed one. Returns the count
    /// of documents indexed.
    pub async fn scan_source(&self, source_id: Uuid, root: &Path, is_bookmarks: bool) -> AppResult<usize> {
        let candidates = if is_bookmarks {
            IngestionService::scan_bookmarks(source_id, root)?
        } else {
            IngestionService::scan_directory(source_id, root)?
        };

        let existing = self.metadata.list_documents_by_source(source_id).await?;
        let mut indexed = 0usize;

        for candidate in candidates {
            let prior = existing.iter().find(|d| d.uri == candidate.uri);

            if let Some(prior_doc) = prior {
                if prior_doc.mtime == candidate.mtime && prior_doc.size_bytes == candidate.size_bytes {
                    continue;
                }
            }

            let status = if prior.is_some() { DocumentStatus::Changed } else { DocumentStatus::New };

            let mut doc = match prior {
                Some(existing_doc) => {
                    let mut merged = existing_doc.clone();
                    merged.title = candidate.title;
                    merged.mime_type = candidate.mime_type;
                    merged.size_bytes = candidate.size_bytes;
                    merged.mtime = candidate.mtime;
                    merged
                }
                None => candidate,
            };
            doc.status = status;
            let doc = self.metadata.upsert_document(doc).await?;

            match self.index_document(doc.id, root, is_bookmarks).await {
                Ok(true) => indexed += 1,
                Ok(false) => {
                    // mtime/size_bytes looked changed but the content hash
                    // didn't: restore the indexed status rather than
                    // leaving it at the transient new/changed status.
                    let mut unchanged = doc;
                    unchanged.status = DocumentStatus::Indexed;
                    self.metadata.upsert_document(unchanged).await?;
                }
                Err(e) => {
                    warn!(document_id = %doc.id, error = %e, "indexing failed");
                    let mut failed = doc;
                    failed.status = DocumentStatus::Error;
                    self.metadata.upsert_document(failed).await?;
                }
            }
        }

        Ok(indexed)
    }

    /// Extracts, chunks, embeds, and re-indexes a single document.
    /// Returns `Ok(false)` without touching any index if the document's
    /// hash is unchanged since the last successful index.
    pub async fn index_document(&self, doc_id: Uuid, _source_root: &Path, _is_bookmarks: bool) -> AppResult<bool> {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let doc = self
            .metadata
            .get_document(doc_id)
            .await?
            .ok_or_else(|| crate::error::AppError::NotFound(format!("document {doc_id}")))?;

        let bytes = read_document_bytes(&doc)?;
        let extractor = extract::extractor_for(&doc.uri, &doc.mime_type, self.config.web_fetch.clone());
        let extracted = extractor.extract(&doc.uri, &bytes).await?;

        let new_hash = hash_text(&extracted.text);
        if doc.doc_hash.as_deref() == Some(new_hash.as_str()) {
            return Ok(false);
        }

        let chunks = chunk_text(
            doc.id,
            &extracted.text,
            self.config.ingestion.chunk_size_tokens,
            self.config.ingestion.chunk_overlap_tokens,
        );

        // Purge before rewrite: chunk rows, lexical rows, and vector
        // mappings for this document must never accumulate across
        // re-indexes.
        self.metadata.delete_chunks(doc.id).await?;
        self.lexical.delete_doc(doc.id).await?;
        self.vector.delete_doc(doc.id).await?;

        for chunk in &chunks {
            self.metadata.upsert_chunk(chunk.clone()).await?;
        }

        let title = extracted.title.as_deref().or(doc.title.as_deref());
        self.lexical.upsert_chunks(&chunks, title, &doc.uri).await?;

        if let Some(provider) = &self.embedding {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embed_with_cache(provider.as_ref(), &texts).await?;
            if !chunks.is_empty() {
                self.vector.upsert_embeddings(&chunks, &vectors).await?;
            }
        }

        let mut indexed = doc;
        indexed.doc_hash = Some(new_hash);
        indexed.status = DocumentStatus::Indexed;
        self.metadata.upsert_document(indexed).await?;

        info!(document_id = %doc_id, chunks = chunks.len(), "document indexed");
        Ok(true)
    }

    async fn embed_with_cache(
        &self,
        provider: &dyn EmbeddingProvider,
        texts: &[String],
    ) -> AppResult<Vec<Vec<f32>>> {
        let Some(cache) = &self.embedding_cache else {
            return provider.embed_texts(texts).await;
        };

        let (mut hits, misses) = cache.partition(texts, provider.model_name());
        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|(_, t)| t.to_string()).collect();
            let fresh = provider.embed_texts(&miss_texts).await?;
            for ((index, text), vector) in misses.into_iter().zip(fresh.into_iter()) {
                cache.put(text, provider.model_name(), &vector)?;
                hits[index] = Some(vector);
            }
        }

        Ok(hits.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}

fn read_document_bytes(doc: &Document) -> AppResult<Vec<u8>> {
    if let Some(path) = doc.uri.strip_prefix("file://") {
        return Ok(std::fs::read(path)?);
    }
    // http(s):// and other remote URIs are fetched by the extractor itself
    // (gated on `web_fetch.enabled`); no local bytes to read here.
    Ok(Vec::new())
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
