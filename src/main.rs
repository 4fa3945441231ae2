//! # Coursebot CLI
//!
//! The `coursebot` binary manages the course index and runs the chatbot
//! server.
//!
//! ## Usage
//!
//! ```bash
//! coursebot --config ./config/coursebot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `coursebot init` | Create the SQLite database and schema |
//! | `coursebot ingest <path>` | Index a course document or folder |
//! | `coursebot search "<query>"` | Search indexed course content |
//! | `coursebot courses` | List indexed courses |
//! | `coursebot serve` | Start the HTTP chatbot server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! coursebot init --config ./config/coursebot.toml
//!
//! # Index a folder of course documents
//! coursebot ingest ./docs --config ./config/coursebot.toml
//!
//! # Search within one course
//! coursebot search "embeddings" --course "MCP" --config ./config/coursebot.toml
//!
//! # Start the server (requires ANTHROPIC_API_KEY)
//! coursebot serve --config ./config/coursebot.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use coursebot::config;
use coursebot::db;
use coursebot::migrate;
use coursebot::rag;
use coursebot::server;
use coursebot::store::VectorStore;

/// Coursebot — a retrieval-augmented chatbot over course materials.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/coursebot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "coursebot",
    about = "Coursebot — a retrieval-augmented chatbot over course materials",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/coursebot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (catalog,
    /// chunks, chunk_vectors, chunks_fts). Idempotent.
    Init,

    /// Index one course document or a folder of documents.
    ///
    /// Supported formats: `.txt`, `.md`, `.pdf`, `.docx`. Folder ingestion
    /// skips courses whose title is already indexed.
    Ingest {
        /// Path to a document file or a folder of documents.
        path: PathBuf,

        /// Drop the existing index before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// Search indexed course content.
    Search {
        /// The search query string.
        query: String,

        /// Restrict to one course (partial titles resolve).
        #[arg(long)]
        course: Option<String>,

        /// Restrict to one lesson number.
        #[arg(long)]
        lesson: Option<i64>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// List indexed courses.
    Courses,

    /// Start the HTTP chatbot server.
    ///
    /// Serves `POST /api/query` and `GET /api/courses`, plus frontend assets
    /// when `[server].static_dir` is configured. Ingests `[docs].folder` at
    /// startup.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, clear } => {
            let store = open_store(&cfg).await?;

            if path.is_dir() {
                let (courses, chunks) =
                    rag::add_course_folder(&cfg.chunking, &store, &path, clear).await?;
                println!("Indexed {} courses ({} chunks).", courses, chunks);
            } else {
                if clear {
                    store.clear_all().await?;
                }
                let (title, chunks) =
                    rag::add_course_document(&cfg.chunking, &store, &path).await?;
                println!("Indexed '{}' ({} chunks).", title, chunks);
            }
        }
        Commands::Search {
            query,
            course,
            lesson,
            limit,
        } => {
            let store = open_store(&cfg).await?;
            let results = store
                .search(&query, course.as_deref(), lesson, limit)
                .await?;

            if let Some(error) = results.error {
                println!("{}", error);
                return Ok(());
            }
            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in results.hits.iter().enumerate() {
                match hit.lesson_number {
                    Some(n) => println!("{}. [{} - Lesson {}]", i + 1, hit.course_title, n),
                    None => println!("{}. [{}]", i + 1, hit.course_title),
                }
                println!("   {}", snippet(&hit.content, 200));
            }
        }
        Commands::Courses => {
            let store = open_store(&cfg).await?;
            let titles = store.existing_course_titles().await?;
            println!("{} courses indexed.", titles.len());
            for title in titles {
                println!("  {}", title);
            }
        }
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "info".into()),
                )
                .init();
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn open_store(cfg: &config::Config) -> anyhow::Result<Arc<VectorStore>> {
    let pool = db::connect(cfg).await?;
    migrate::apply_schema(&pool).await?;
    Ok(Arc::new(VectorStore::new(
        pool,
        cfg.embedding.clone(),
        cfg.retrieval.clone(),
    )))
}

/// First line of a chunk, truncated on a char boundary.
fn snippet(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
