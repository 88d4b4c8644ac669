//! SearchService: hybrid lexical + vector retrieval fused with Reciprocal
//! Rank Fusion (RRF).
//!
//! RRF scores each chunk by `1 / (k + rank)` per ranking it appears in
//! (rank is 1-based) and sums across rankings — this needs no score
//! normalization, unlike a min-max weighted-alpha blend. Chunks are
//! hydrated from `MetadataStore` for the final `SearchResult`; a no-op
//! placeholder reranker stage preserves RRF order rather than overwriting
//! it with a flat score.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::AppResult;
use crate::lexical::LexicalIndex;
use crate::metadata::MetadataStore;
use crate::models::{ScoreBreakdown, SearchResult};
use crate::vector::VectorStore;

/// A post-fusion scoring stage. Implementations may inspect the fused
/// candidates and the original query to produce a replacement score per
/// chunk, but `SearchService::search` never reorders by it unless an
/// implementation is explicitly wired in to do so — see [`NoOpReranker`].
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, candidates: &[(Uuid, f64)]) -> Vec<f64>;
}

/// The default reranker: returns a flat `0.0` for every candidate. Its
/// scores are computed but never used to reorder results — RRF order is
/// the fusion stage's final say unless a real reranker replaces this one.
pub struct NoOpReranker;

impl Reranker for NoOpReranker {
    fn rerank(&self, _query: &str, candidates: &[(Uuid, f64)]) -> Vec<f64> {
        vec![0.0; candidates.len()]
    }
}

pub struct SearchService {
    metadata: Arc<dyn MetadataStore>,
    lexical: Arc<dyn LexicalIndex>,
    vector: Arc<dyn VectorStore>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    rrf_k: f64,
    reranker: Arc<dyn Reranker>,
}

impl SearchService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        lexical: Arc<dyn LexicalIndex>,
        vector: Arc<dyn VectorStore>,
        embedding: Option<Arc<dyn EmbeddingProvider>>,
        rrf_k: f64,
    ) -> Self {
        Self {
            metadata,
            lexical,
            vector,
            embedding,
            rrf_k,
            reranker: Arc::new(NoOpReranker),
        }
    }

    /// Runs lexical and (if embeddings are enabled) vector search, fuses
    /// both rankings with RRF, hydrates the top `limit` chunks against
    /// their parent documents, and returns them in fused-score order.
    ///
    /// An empty query returns an empty result set.
    pub async fn search(&self, query: &str, top_k_lex: usize, top_k_vec: usize, limit: usize) -> AppResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let lex_hits = self.lexical.search(query, top_k_lex as i64).await?;

        let vec_hits = if let Some(provider) = &self.embedding {
            let query_vec = provider
                .embed_texts(std::slice::from_ref(&query.to_string()))
                .await?
                .into_iter()
                .next()
                .unwrap_or_default();
            self.vector.query(&query_vec, top_k_vec as i64).await?
        } else {
            Vec::new()
        };

        let fused = fuse_rrf(&lex_hits, &vec_hits, self.rrf_k);

        // The reranker runs for every candidate, but its output is
        // discarded: RRF order is the ordering signal, and a reranker
        // (even the no-op one) never overwrites it by being consulted
        // after the sort already happened.
        let rerank_input: Vec<(Uuid, f64)> = fused.iter().map(|h| (h.chunk_id, h.score)).collect();
        let _ = self.reranker.rerank(query, &rerank_input);

        let candidates: Vec<&FusedHit> = fused.iter().take(limit.saturating_mul(2).max(limit)).collect();

        let mut results = Vec::with_capacity(limit);
        for hit in candidates {
            if results.len() == limit {
                break;
            }
            let Some(chunk) = self.metadata.get_chunk(hit.chunk_id).await? else {
                continue;
            };
            let Some(doc) = self.metadata.get_document(chunk.doc_id).await? else {
                continue;
            };

            results.push(SearchResult {
                chunk_id: chunk.id,
                doc_id: doc.id,
                text: chunk.text,
                doc_title: doc.title,
                doc_uri: doc.uri,
                score: hit.score,
                score_breakdown: ScoreBreakdown {
                    lex_score: hit.lex_score.unwrap_or(0.0),
                    lex_rank: hit.lex_rank,
                    vec_score: hit.vec_score.unwrap_or(0.0),
                    vec_rank: hit.vec_rank,
                },
            });
        }

        Ok(results)
    }
}

struct FusedHit {
    chunk_id: Uuid,
    score: f64,
    lex_score: Option<f64>,
    lex_rank: Option<usize>,
    vec_score: Option<f64>,
    vec_rank: Option<usize>,
}

/// Fuses two `(chunk_id, score)` rankings (already sorted best-first) via
/// Reciprocal Rank Fusion and sorts the result by fused score descending,
/// tie-broken by higher lexical score, then by `chunk_id` ascending for a
/// fully deterministic order.
fn fuse_rrf(lex_hits: &[(Uuid, f64)], vec_hits: &[(Uuid, f64)], k: f64) -> Vec<FusedHit> {
    struct Entry {
        lex_score: Option<f64>,
        lex_rank: Option<usize>,
        vec_score: Option<f64>,
        vec_rank: Option<usize>,
    }

    let mut entries: HashMap<Uuid, Entry> = HashMap::new();

    for (rank, (chunk_id, score)) in lex_hits.iter().enumerate() {
        let e = entries.entry(*chunk_id).or_insert(Entry {
            lex_score: None,
            lex_rank: None,
            vec_score: None,
            vec_rank: None,
        });
        e.lex_score = Some(*score);
        e.lex_rank = Some(rank + 1);
    }
    for (rank, (chunk_id, score)) in vec_hits.iter().enumerate() {
        let e = entries.entry(*chunk_id).or_insert(Entry {
            lex_score: None,
            lex_rank: None,
            vec_score: None,
            vec_rank: None,
        });
        e.vec_score = Some(*score);
        e.vec_rank = Some(rank + 1);
    }

    let mut fused: Vec<FusedHit> = entries
        .into_iter()
        .map(|(chunk_id, e)| {
            let mut score = 0.0;
            if let Some(rank) = e.lex_rank {
                score += 1.0 / (k + rank as f64);
            }
            if let Some(rank) = e.vec_rank {
                score += 1.0 / (k + rank as f64);
            }
            FusedHit {
                chunk_id,
                score,
                lex_score: e.lex_score,
                lex_rank: e.lex_rank,
                vec_score: e.vec_score,
                vec_rank: e.vec_rank,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.lex_score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.lex_score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn fuse_rewards_agreement_across_both_rankings() {
        let lex = vec![(uid(1), 10.0), (uid(2), 5.0)];
        let vec_hits = vec![(uid(2), 0.9), (uid(1), 0.1)];
        let fused = fuse_rrf(&lex, &vec_hits, 60.0);

        // Both chunks appear in both rankings at rank 1 and rank 2, so
        // their fused scores should be identical and higher than a chunk
        // appearing in only one ranking.
        assert_eq!(fused.len(), 2);
        let only_lex = fuse_rrf(&[(uid(3), 1.0)], &[], 60.0);
        assert!(fused[0].score > only_lex[0].score);
    }

    #[test]
    fn fuse_orders_by_score_then_chunk_id() {
        let lex = vec![(uid(1), 1.0)];
        let vec_hits = vec![(uid(1), 1.0), (uid(2), 1.0)];
        let fused = fuse_rrf(&lex, &vec_hits, 60.0);
        // uid(1) is in both rankings (rank 1 lex, rank 1 vec); uid(2) is
        // only in the vector ranking at rank 2 — uid(1) must win.
        assert_eq!(fused[0].chunk_id, uid(1));
    }

    #[test]
    fn fuse_breaks_ties_deterministically() {
        let lex = vec![(uid(9), 1.0)];
        let vec_hits = vec![(uid(9), 1.0)];
        let a = fuse_rrf(&lex, &vec_hits, 60.0);
        let b = fuse_rrf(&lex, &vec_hits, 60.0);
        assert_eq!(a[0].chunk_id, b[0].chunk_id);
    }

    #[test]
    fn no_op_reranker_returns_flat_zero_scores() {
        let candidates = vec![(uid(1), 0.9), (uid(2), 0.1)];
        let scores = NoOpReranker.rerank("query", &candidates);
        assert_eq!(scores, vec![0.0, 0.0]);
    }
}
