//! Orchestrator wiring document ingestion, retrieval tools, generation, and
//! session history into a single query path.
//!
//! Ingestion is exposed as free functions over the store so the CLI can index
//! documents without a generation credential; [`RagSystem`] owns the
//! generation-side wiring used by the server.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{ChunkingConfig, Config};
use crate::document;
use crate::generator::Generator;
use crate::models::SourceRef;
use crate::session::SessionManager;
use crate::store::VectorStore;
use crate::tools::{CourseOutlineTool, CourseSearchTool, ToolManager};

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx"];

/// Parse and index one course document. Returns the course title and the
/// number of chunks indexed.
pub async fn add_course_document(
    chunking: &ChunkingConfig,
    store: &VectorStore,
    path: &Path,
) -> Result<(String, usize)> {
    let (course, chunks) =
        document::parse_course_document(path, chunking.chunk_size, chunking.chunk_overlap)
            .with_context(|| format!("failed to parse {}", path.display()))?;

    store.add_course_metadata(&course).await?;
    store.add_course_content(&chunks).await?;

    Ok((course.title, chunks.len()))
}

/// Index every supported document in a folder, skipping courses whose title
/// is already present. Returns (courses added, chunks added).
pub async fn add_course_folder(
    chunking: &ChunkingConfig,
    store: &VectorStore,
    folder: &Path,
    clear: bool,
) -> Result<(usize, usize)> {
    if !folder.is_dir() {
        anyhow::bail!("document folder does not exist: {}", folder.display());
    }

    if clear {
        info!("clearing existing index");
        store.clear_all().await?;
    }

    let mut existing = store.existing_course_titles().await?;

    let mut entries: Vec<_> = std::fs::read_dir(folder)
        .with_context(|| format!("failed to read {}", folder.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    let mut courses_added = 0;
    let mut chunks_added = 0;

    for entry in entries {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        if !matches!(ext.as_deref(), Some(e) if SUPPORTED_EXTENSIONS.contains(&e)) {
            continue;
        }

        let (course, chunks) = match document::parse_course_document(
            &path,
            chunking.chunk_size,
            chunking.chunk_overlap,
        ) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{:#}", err), "skipping document");
                continue;
            }
        };

        if existing.contains(&course.title) {
            info!(course = %course.title, "already indexed, skipping");
            continue;
        }

        store.add_course_metadata(&course).await?;
        store.add_course_content(&chunks).await?;

        info!(course = %course.title, chunks = chunks.len(), "indexed course");
        courses_added += 1;
        chunks_added += chunks.len();
        existing.push(course.title);
    }

    Ok((courses_added, chunks_added))
}

/// Query-side orchestrator: retrieval tools, hosted generation, and session
/// history behind a single [`RagSystem::query`] call.
pub struct RagSystem {
    config: Config,
    store: Arc<VectorStore>,
    generator: Generator,
    tools: ToolManager,
    sessions: SessionManager,
}

impl RagSystem {
    pub fn new(config: Config, store: Arc<VectorStore>, generator: Generator) -> Self {
        let mut tools = ToolManager::new();
        tools.register(Arc::new(CourseSearchTool::new(store.clone())));
        tools.register(Arc::new(CourseOutlineTool::new(store.clone())));

        let sessions = SessionManager::new(config.session.max_history);

        Self {
            config,
            store,
            generator,
            tools,
            sessions,
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn add_course_folder(&self, folder: &Path, clear: bool) -> Result<(usize, usize)> {
        add_course_folder(&self.config.chunking, &self.store, folder, clear).await
    }

    /// Answer one query within a session. Returns the answer plus the sources
    /// any search tool consulted along the way.
    pub async fn query(&self, text: &str, session_id: &str) -> Result<(String, Vec<SourceRef>)> {
        let history = self.sessions.history(session_id);

        let answer = self
            .generator
            .generate_response(text, history.as_deref(), &self.tools)
            .await?;

        let sources = self.tools.last_sources();
        self.tools.reset_sources();

        self.sessions.add_exchange(session_id, text, &answer);

        Ok((answer, sources))
    }

    /// Index analytics for the courses endpoint.
    pub async fn analytics(&self) -> Result<(i64, Vec<String>)> {
        let count = self.store.course_count().await?;
        let titles = self.store.existing_course_titles().await?;
        Ok((count, titles))
    }
}
