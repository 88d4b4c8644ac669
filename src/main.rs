//! CLI entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use docweave::config;
use docweave::models::Source;
use docweave::server;

#[derive(Parser)]
#[command(
    name = "docweave",
    about = "A local-first hybrid document search engine",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/docweave.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Register a new Source
    AddSource {
        /// Human-readable name
        name: String,
        /// Filesystem directory, or path to a Chrome Bookmarks file
        path: String,
        /// Treat `path` as a Chrome Bookmarks JSON file instead of a directory
        #[arg(long)]
        bookmarks: bool,
    },

    /// List registered Sources
    Sources,

    /// Scan a Source and index everything new or changed
    Scan {
        /// Source UUID
        source_id: Uuid,
    },

    /// Search indexed documents
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Start the HTTP server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            docweave::migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::AddSource { name, path, bookmarks } => {
            let (metadata, ..) = server::build_services(&cfg).await?;
            let mut config_map = std::collections::HashMap::new();
            config_map.insert("is_bookmarks".to_string(), serde_json::json!(bookmarks));
            let source = Source::new(name, path, config_map);
            let source = metadata.upsert_source(source).await?;
            println!("Registered source {} ({})", source.name, source.id);
        }
        Commands::Sources => {
            let (metadata, ..) = server::build_services(&cfg).await?;
            for source in metadata.list_sources().await? {
                println!("{}  {}  {}", source.id, source.name, source.path);
            }
        }
        Commands::Scan { source_id } => {
            let (metadata, _lexical, _vector, _embedding, indexing, _search) =
                server::build_services(&cfg).await?;
            let source = metadata
                .get_source(source_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("source {source_id} not found"))?;
            let is_bookmarks = source
                .config
                .get("is_bookmarks")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let root = PathBuf::from(&source.path);
            let indexed = indexing.scan_source(source_id, &root, is_bookmarks).await?;
            println!("Indexed {indexed} document(s).");
        }
        Commands::Search { query, limit } => {
            let (.., search) = server::build_services(&cfg).await?;
            let results = search
                .search(&query, cfg.retrieval.top_k_lex, cfg.retrieval.top_k_vec, limit)
                .await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                let title = r.doc_title.as_deref().unwrap_or("(untitled)");
                println!("{}. [{:.4}] {} — {}", i + 1, r.score, title, r.doc_uri);
                println!("    {}", r.text.replace('\n', " ").chars().take(200).collect::<String>());
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
