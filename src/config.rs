//! Configuration parsing and validation.
//!
//! The app is configured via a YAML file (default: `config/docweave.yaml`).
//! Every key may be overridden by an environment variable with prefix
//! `APP_` and `_` as the path separator, e.g.
//! `APP_INGESTION_CHUNK_SIZE_TOKENS=512` overrides `ingestion.chunk_size_tokens`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetadataBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LexicalBackend {
    Fts5,
    PgFts,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    Faiss,
    Pgvector,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub faiss_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    pub chunk_size_tokens: usize,
    #[serde(default)]
    pub chunk_overlap_tokens: usize,
    pub max_file_mb: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BookmarksConfig {
    #[serde(default)]
    pub chrome_bookmarks_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebFetchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_web_fetch_timeout")]
    pub timeout_sec: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_sec: default_web_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_web_fetch_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "docweave/1.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model_name: String,
    pub dim: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    5
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k_lex")]
    pub top_k_lex: usize,
    #[serde(default = "default_top_k_vec")]
    pub top_k_vec: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_indexing_concurrency")]
    pub indexing_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_lex: default_top_k_lex(),
            top_k_vec: default_top_k_vec(),
            rrf_k: default_rrf_k(),
            indexing_concurrency: default_indexing_concurrency(),
        }
    }
}

fn default_top_k_lex() -> usize {
    20
}
fn default_top_k_vec() -> usize {
    20
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_indexing_concurrency() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub metadata_backend: MetadataBackend,
    pub lexical_backend: LexicalBackend,
    pub vector_backend: VectorBackend,
    pub storage: StorageConfig,
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub bookmarks: BookmarksConfig,
    #[serde(default)]
    pub web_fetch: WebFetchConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Loads the YAML config at `path`, layers `APP_`-prefixed environment
/// overrides on top, and validates the result.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let mut value: serde_yaml::Value =
        serde_yaml::from_str(&content).with_context(|| "failed to parse config file as YAML")?;

    apply_env_overrides(&mut value, "APP")?;

    let config: Config =
        serde_yaml::from_value(value).with_context(|| "failed to deserialize config")?;

    validate(&config)?;
    Ok(config)
}

/// Recursively maps `APP_SECTION_KEY` style environment variables onto the
/// parsed YAML tree, so e.g. `APP_INGESTION_CHUNK_SIZE_TOKENS` overrides
/// `ingestion.chunk_size_tokens` without needing a schema-aware layering
/// crate: plain data in, then validated once fully deserialized.
fn apply_env_overrides(value: &mut serde_yaml::Value, prefix: &str) -> Result<()> {
    let serde_yaml::Value::Mapping(map) = value else {
        return Ok(());
    };

    let keys: Vec<String> = map
        .keys()
        .filter_map(|k| k.as_str().map(|s| s.to_string()))
        .collect();

    for key in keys {
        let env_key = format!("{prefix}_{}", key.to_uppercase());
        let entry = map
            .get_mut(serde_yaml::Value::String(key.clone()))
            .expect("key came from map.keys()");

        if matches!(entry, serde_yaml::Value::Mapping(_)) {
            apply_env_overrides(entry, &env_key)?;
            continue;
        }

        if let Ok(raw) = std::env::var(&env_key) {
            *entry = coerce_env_value(&raw);
        }
    }

    Ok(())
}

fn coerce_env_value(raw: &str) -> serde_yaml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return serde_yaml::Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return serde_yaml::Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        return serde_yaml::Value::Number(f.into());
    }
    serde_yaml::Value::String(raw.to_string())
}

fn validate(config: &Config) -> Result<()> {
    if config.ingestion.chunk_size_tokens == 0 {
        bail!("ingestion.chunk_size_tokens must be > 0");
    }
    if config.ingestion.chunk_overlap_tokens >= config.ingestion.chunk_size_tokens {
        bail!("ingestion.chunk_overlap_tokens must be < ingestion.chunk_size_tokens");
    }
    if config.ingestion.max_file_mb == 0 {
        bail!("ingestion.max_file_mb must be > 0");
    }
    if config.web_fetch.timeout_sec == 0 {
        bail!("web_fetch.timeout_sec must be > 0");
    }
    if config.embedding.dim == 0 {
        bail!("embedding.dim must be > 0");
    }
    if config.retrieval.indexing_concurrency == 0 {
        bail!("retrieval.indexing_concurrency must be > 0");
    }
    Ok(())
}
