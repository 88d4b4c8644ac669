//! Content-addressed disk cache for embedding vectors.
//!
//! Keyed on `sha256(text || model_name)`, so a re-embedded chunk whose text
//! and model haven't changed is served from disk instead of calling the
//! remote provider again. One vector per file, JSON-encoded, under
//! `<data_dir>/cache/embeddings/<sha256>.json`. Writes go through a
//! temp-file-then-rename so a crash mid-write can never leave a corrupt
//! cache entry.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::AppResult;

pub struct EmbeddingCache {
    dir: PathBuf,
}

impl EmbeddingCache {
    pub fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, text: &str, model: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(model.as_bytes());
        let digest = hasher.finalize();
        self.dir.join(format!("{digest:x}.json"))
    }

    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let path = self.key_path(text, model);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn put(&self, text: &str, model: &str, vector: &[f32]) -> AppResult<()> {
        let path = self.key_path(text, model);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(vector)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Splits `texts` into already-cached vectors and the remaining texts
    /// (with their original positions) that still need embedding.
    pub fn partition<'a>(
        &self,
        texts: &'a [String],
        model: &str,
    ) -> (Vec<Option<Vec<f32>>>, Vec<(usize, &'a str)>) {
        let mut hits = Vec::with_capacity(texts.len());
        let mut misses = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            match self.get(text, model) {
                Some(v) => hits.push(Some(v)),
                None => {
                    hits.push(None);
                    misses.push((i, text.as_str()));
                }
            }
        }
        (hits, misses)
    }
}

pub fn cache_dir_for(data_dir: &Path) -> PathBuf {
    data_dir.join("cache").join("embeddings")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_for_nests_under_cache_embeddings() {
        let data_dir = Path::new("/tmp/docweave-data");
        assert_eq!(cache_dir_for(data_dir), data_dir.join("cache").join("embeddings"));
    }

    #[test]
    fn miss_then_hit_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(dir.path()).unwrap();
        assert!(cache.get("hello", "model-a").is_none());

        cache.put("hello", "model-a", &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(cache.get("hello", "model-a"), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn different_model_is_a_different_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(dir.path()).unwrap();
        cache.put("hello", "model-a", &[1.0]).unwrap();
        assert!(cache.get("hello", "model-b").is_none());
    }

    #[test]
    fn put_writes_one_json_file_per_vector() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(dir.path()).unwrap();
        cache.put("hello", "model-a", &[1.0, 2.0]).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[1.0,2.0]");
    }

    #[test]
    fn partition_separates_hits_from_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(dir.path()).unwrap();
        cache.put("a", "m", &[1.0]).unwrap();

        let texts = vec!["a".to_string(), "b".to_string()];
        let (hits, misses) = cache.partition(&texts, "m");
        assert_eq!(hits[0], Some(vec![1.0]));
        assert_eq!(hits[1], None);
        assert_eq!(misses, vec![(1, "b")]);
    }
}
