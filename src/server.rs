//! HTTP API for the course chatbot.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a query within a session |
//! | `GET`  | `/api/courses` | Course count and title list |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! When `[server].static_dir` is set, frontend assets are served from it at
//! `/`. All origins, methods, and headers are permitted so browser frontends
//! can call the API directly.
//!
//! At startup, documents in `[docs].folder` (when configured) are ingested
//! before the listener binds; courses already indexed are skipped by title.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::config::Config;
use crate::generator::Generator;
use crate::models::SourceRef;
use crate::rag::RagSystem;
use crate::store::VectorStore;

#[derive(Clone)]
struct AppState {
    rag: Arc<RagSystem>,
}

/// Starts the HTTP server.
///
/// Connects to the index database, ingests the configured document folder,
/// and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;

    let store = Arc::new(VectorStore::new(
        pool,
        config.embedding.clone(),
        config.retrieval.clone(),
    ));
    let generator = Generator::new(config.generation.clone())?;
    let rag = Arc::new(RagSystem::new(config.clone(), store, generator));

    if let Some(folder) = &config.docs.folder {
        match rag.add_course_folder(folder, false).await {
            Ok((courses, chunks)) => {
                info!(courses, chunks, "startup ingestion complete");
            }
            Err(err) => {
                error!(error = %format!("{:#}", err), "startup ingestion failed");
            }
        }
    }

    let state = AppState { rag };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/courses", get(handle_courses))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    if let Some(static_dir) = &config.server.static_dir {
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    info!(bind = %config.server.bind, "listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %format!("{:#}", self.0), "request failed");
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
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

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<SourceRef>,
    session_id: String,
}

/// Answers one query. A missing `session_id` starts a new session; the
/// assigned id is returned for the client to reuse on the next turn.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let session_id = match request.session_id {
        Some(id) if !id.is_empty() => id,
        _ => state.rag.sessions().create_session(),
    };

    let (answer, sources) = state.rag.query(&request.query, &session_id).await?;

    Ok(Json(QueryResponse {
        answer,
        sources,
        session_id,
    }))
}

// ============ GET /api/courses ============

#[derive(Serialize)]
struct CoursesResponse {
    total_courses: i64,
    course_titles: Vec<String>,
}

async fn handle_courses(
    State(state): State<AppState>,
) -> Result<Json<CoursesResponse>, AppError> {
    let (total_courses, course_titles) = state.rag.analytics().await?;
    Ok(Json(CoursesResponse {
        total_courses,
        course_titles,
    }))
}
