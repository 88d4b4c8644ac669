//! BPE sliding-window text chunker.
//!
//! Splits document text into token windows of `chunk_size` with
//! `chunk_overlap` tokens shared between consecutive windows (stride =
//! `chunk_size - chunk_overlap`). Chunk boundaries are token boundaries, but
//! each chunk also carries its byte offsets within the original text,
//! recovered by searching forward for the decoded chunk text from an
//! advancing cursor.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Fallback ratio when the tokenizer can't be used to split a window
/// (cl100k_base should never fail on valid UTF-8, but windows spanning
/// decode boundaries are handled defensively with a char-based split).
const CHARS_PER_TOKEN: usize = 4;

/// Splits `text` into chunks of at most `chunk_size` tokens, with
/// `chunk_overlap` tokens of overlap between consecutive chunks.
///
/// `0 <= chunk_overlap < chunk_size` is assumed (enforced by
/// `config::validate`). Empty input produces an empty chunk list.
pub fn chunk_text(doc_id: Uuid, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let bpe = tiktoken_rs::cl100k_base().expect("cl100k_base vocab is bundled");
    let tokens = bpe.encode_with_special_tokens(text);

    if tokens.is_empty() {
        return Vec::new();
    }

    let stride = chunk_size - chunk_overlap;
    let mut windows: Vec<Vec<usize>> = Vec::new();
    let mut start = 0;
    while start < tokens.len() {
        let end = (start + chunk_size).min(tokens.len());
        windows.push(tokens[start..end].to_vec());
        if end == tokens.len() {
            break;
        }
        start += stride;
    }

    let mut chunks = Vec::with_capacity(windows.len());
    let mut cursor = 0usize;

    for (index, window) in windows.into_iter().enumerate() {
        let chunk_text = match bpe.decode(window) {
            Ok(decoded) => decoded,
            Err(_) => char_window_fallback(text, index, chunk_size, chunk_overlap),
        };
        let trimmed = chunk_text.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (start_offset, end_offset) = match text[cursor.min(text.len())..].find(trimmed) {
            Some(found) => {
                let abs_start = cursor + found;
                let abs_end = abs_start + trimmed.len();
                // Advance just past the match start (not past the whole
                // chunk) so an overlapping next chunk can still be found
                // starting from inside this one.
                cursor = abs_start + 1;
                (abs_start as i64, abs_end as i64)
            }
            None => (0, trimmed.len() as i64),
        };

        chunks.push(Chunk {
            id: Uuid::new_v4(),
            doc_id,
            chunk_index: chunks.len() as i64,
            text: trimmed.to_string(),
            start_offset,
            end_offset,
            chunk_hash: hash_text(trimmed),
        });
    }

    chunks
}

fn char_window_fallback(text: &str, index: usize, chunk_size: usize, chunk_overlap: usize) -> String {
    let max_chars = chunk_size * CHARS_PER_TOKEN;
    let overlap_chars = chunk_overlap * CHARS_PER_TOKEN;
    let stride_chars = max_chars.saturating_sub(overlap_chars).max(1);
    let start = index * stride_chars;
    let end = (start + max_chars).min(text.len());
    if start >= text.len() {
        return String::new();
    }
    text.get(start..end).unwrap_or_default().to_string()
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
