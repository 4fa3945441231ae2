use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema and close the pool. CLI `init` entry point.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the two collections (course catalog + course content) and their
/// search side-tables. Idempotent; `init` may run any number of times.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Course catalog: one row per course, used for fuzzy title resolution
    // and the outline tool.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog (
            title TEXT PRIMARY KEY,
            instructor TEXT,
            course_link TEXT,
            lessons_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Course content: one row per chunk.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            course_title TEXT NOT NULL,
            lesson_number INTEGER,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL DEFAULT 0,
            content TEXT NOT NULL,
            UNIQUE(course_title, chunk_index),
            FOREIGN KEY (course_title) REFERENCES catalog(title)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding vectors for chunks, keyed separately so keyword-only
    // deployments never touch them.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            course_title TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 virtual table over chunk text for the keyword channel.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                course_title UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_course_title ON chunks(course_title)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_lesson ON chunks(course_title, lesson_number)")
        .execute(pool)
        .await?;

    Ok(())
}
