//! Vector index wrapper over the two course collections.
//!
//! The catalog collection holds one row per course and backs fuzzy title
//! resolution plus the outline tool; the content collection holds one row per
//! chunk and backs semantic retrieval. Course-name filters are resolved in
//! two steps: nearest-match lookup against the catalog first, then the
//! resolved exact title as an equality filter on the content search.
//!
//! Content ranking uses cosine similarity over stored chunk vectors when an
//! embedding provider is configured, and falls back to the FTS5 keyword
//! channel otherwise. Ranking itself is delegated; no custom scoring lives
//! here.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embedding;
use crate::models::{Course, CourseChunk, Lesson};

/// A ranked content match returned from [`VectorStore::search`].
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<i64>,
    pub score: f64,
}

/// Search outcome. An empty `hits` with `error = None` is a successful
/// zero-result search; `error` is set when the search itself could not be
/// performed as asked (e.g. an unresolvable course name).
#[derive(Debug, Default)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub error: Option<String>,
}

impl SearchResults {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            hits: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Full course outline for the outline tool.
#[derive(Debug, Clone, Serialize)]
pub struct CourseOutline {
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<Lesson>,
}

pub struct VectorStore {
    pool: SqlitePool,
    embedding: EmbeddingConfig,
    retrieval: RetrievalConfig,
}

impl VectorStore {
    pub fn new(pool: SqlitePool, embedding: EmbeddingConfig, retrieval: RetrievalConfig) -> Self {
        Self {
            pool,
            embedding,
            retrieval,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Add one course to the catalog collection. Replaces an existing row
    /// for the same title. The title is embedded (when a provider is
    /// configured) so partial names can resolve by similarity.
    pub async fn add_course_metadata(&self, course: &Course) -> Result<()> {
        let lessons_json = serde_json::to_string(&course.lessons)?;

        let title_blob = if self.embedding.is_enabled() {
            let provider = embedding::create_provider(&self.embedding)?;
            let vec = embedding::embed_query(provider.as_ref(), &self.embedding, &course.title)
                .await?;
            Some(embedding::vec_to_blob(&vec))
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO catalog (title, instructor, course_link, lessons_json, embedding, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                instructor = excluded.instructor,
                course_link = excluded.course_link,
                lessons_json = excluded.lessons_json,
                embedding = excluded.embedding,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&course.title)
        .bind(&course.instructor)
        .bind(&course.course_link)
        .bind(&lessons_json)
        .bind(&title_blob)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Add content chunks to the content collection, replacing any previous
    /// chunks for the same course.
    pub async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let course_title = &chunks[0].course_title;

        let vectors = if self.embedding.is_enabled() {
            let provider = embedding::create_provider(&self.embedding)?;
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let mut all = Vec::with_capacity(texts.len());
            for batch in texts.chunks(self.embedding.batch_size) {
                let mut vecs =
                    embedding::embed_texts(provider.as_ref(), &self.embedding, batch).await?;
                all.append(&mut vecs);
            }
            Some(all)
        } else {
            None
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE course_title = ?")
            .bind(course_title)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks_fts WHERE course_title = ?")
            .bind(course_title)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE course_title = ?")
            .bind(course_title)
            .execute(&mut *tx)
            .await?;

        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_id = Uuid::new_v4().to_string();

            sqlx::query(
                r#"
                INSERT INTO chunks (id, course_title, lesson_number, chunk_index, start_offset, content)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk_id)
            .bind(&chunk.course_title)
            .bind(chunk.lesson_number)
            .bind(chunk.chunk_index)
            .bind(chunk.start_offset as i64)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, course_title, content) VALUES (?, ?, ?)")
                .bind(&chunk_id)
                .bind(&chunk.course_title)
                .bind(&chunk.content)
                .execute(&mut *tx)
                .await?;

            if let Some(ref vectors) = vectors {
                let blob = embedding::vec_to_blob(&vectors[i]);
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, course_title, embedding) VALUES (?, ?, ?)",
                )
                .bind(&chunk_id)
                .bind(&chunk.course_title)
                .bind(&blob)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Search course content. A `course_name` is resolved against the catalog
    /// first; if it cannot be resolved the result carries an error rather
    /// than silently searching the whole corpus.
    pub async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<i64>,
        limit: Option<i64>,
    ) -> Result<SearchResults> {
        let resolved_title = match course_name {
            Some(name) => match self.resolve_course_name(name).await? {
                Some(title) => Some(title),
                None => {
                    return Ok(SearchResults::failed(format!(
                        "No course found matching '{}'",
                        name
                    )));
                }
            },
            None => None,
        };

        let limit = limit.unwrap_or(self.retrieval.max_results);

        let hits = if self.embedding.is_enabled() {
            self.vector_search(query, resolved_title.as_deref(), lesson_number, limit)
                .await?
        } else {
            self.keyword_search(query, resolved_title.as_deref(), lesson_number, limit)
                .await?
        };

        Ok(SearchResults { hits, error: None })
    }

    /// Resolve a possibly-partial course name to an indexed title.
    ///
    /// Exact (case-insensitive) match wins, then substring containment in
    /// either direction, then embedding nearest-match over catalog rows when
    /// a provider is configured.
    pub async fn resolve_course_name(&self, name: &str) -> Result<Option<String>> {
        let titles = self.existing_course_titles().await?;
        if titles.is_empty() {
            return Ok(None);
        }

        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        for title in &titles {
            if title.to_lowercase() == needle {
                return Ok(Some(title.clone()));
            }
        }
        for title in &titles {
            let hay = title.to_lowercase();
            if hay.contains(&needle) || needle.contains(&hay) {
                return Ok(Some(title.clone()));
            }
        }

        if !self.embedding.is_enabled() {
            return Ok(None);
        }

        // Nearest catalog row by title embedding; the closest match wins.
        let provider = embedding::create_provider(&self.embedding)?;
        let query_vec = embedding::embed_query(provider.as_ref(), &self.embedding, name).await?;

        let rows = sqlx::query("SELECT title, embedding FROM catalog WHERE embedding IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;

        let mut best: Option<(String, f32)> = None;
        for row in &rows {
            let title: String = row.get("title");
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let sim = embedding::cosine_similarity(&query_vec, &vec);
            if best.as_ref().map(|(_, s)| sim > *s).unwrap_or(true) {
                best = Some((title, sim));
            }
        }

        Ok(best.map(|(title, _)| title))
    }

    async fn vector_search(
        &self,
        query: &str,
        course_title: Option<&str>,
        lesson_number: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        let provider = embedding::create_provider(&self.embedding)?;
        let query_vec = embedding::embed_query(provider.as_ref(), &self.embedding, query).await?;

        // Fetch candidate vectors and score in process, as with any embedded
        // vector table without a native index.
        let mut sql = String::from(
            "SELECT c.content, c.course_title, c.lesson_number, cv.embedding \
             FROM chunk_vectors cv JOIN chunks c ON c.id = cv.chunk_id WHERE 1=1",
        );
        if course_title.is_some() {
            sql.push_str(" AND c.course_title = ?");
        }
        if lesson_number.is_some() {
            sql.push_str(" AND c.lesson_number = ?");
        }

        let mut q = sqlx::query(&sql);
        if let Some(title) = course_title {
            q = q.bind(title);
        }
        if let Some(lesson) = lesson_number {
            q = q.bind(lesson);
        }

        let rows = q.fetch_all(&self.pool).await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                SearchHit {
                    content: row.get("content"),
                    course_title: row.get("course_title"),
                    lesson_number: row.get("lesson_number"),
                    score: embedding::cosine_similarity(&query_vec, &vec) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit as usize);

        Ok(hits)
    }

    async fn keyword_search(
        &self,
        query: &str,
        course_title: Option<&str>,
        lesson_number: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        let match_expr = match build_match_query(query) {
            Some(expr) => expr,
            None => return Ok(Vec::new()),
        };

        let mut sql = String::from(
            "SELECT c.content, c.course_title, c.lesson_number, chunks_fts.rank AS rank \
             FROM chunks_fts JOIN chunks c ON c.id = chunks_fts.chunk_id \
             WHERE chunks_fts MATCH ?",
        );
        if course_title.is_some() {
            sql.push_str(" AND c.course_title = ?");
        }
        if lesson_number.is_some() {
            sql.push_str(" AND c.lesson_number = ?");
        }
        sql.push_str(" ORDER BY rank LIMIT ?");

        let mut q = sqlx::query(&sql).bind(&match_expr);
        if let Some(title) = course_title {
            q = q.bind(title);
        }
        if let Some(lesson) = lesson_number {
            q = q.bind(lesson);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                SearchHit {
                    content: row.get("content"),
                    course_title: row.get("course_title"),
                    lesson_number: row.get("lesson_number"),
                    // bm25 rank is lower-is-better; negate so higher = better
                    score: -rank,
                }
            })
            .collect())
    }

    pub async fn existing_course_titles(&self) -> Result<Vec<String>> {
        let titles = sqlx::query_scalar("SELECT title FROM catalog ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(titles)
    }

    pub async fn course_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM catalog")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get_course_link(&self, title: &str) -> Result<Option<String>> {
        let link = sqlx::query_scalar("SELECT course_link FROM catalog WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        Ok(link.flatten())
    }

    pub async fn get_lesson_link(&self, title: &str, lesson_number: i64) -> Result<Option<String>> {
        let outline = match self.fetch_outline_row(title).await? {
            Some(o) => o,
            None => return Ok(None),
        };
        Ok(outline
            .lessons
            .iter()
            .find(|l| l.number == lesson_number)
            .and_then(|l| l.link.clone()))
    }

    /// Full outline for a (possibly partial) course name, or `None` when no
    /// course resolves.
    pub async fn get_course_outline(&self, name: &str) -> Result<Option<CourseOutline>> {
        let title = match self.resolve_course_name(name).await? {
            Some(t) => t,
            None => return Ok(None),
        };
        self.fetch_outline_row(&title).await
    }

    async fn fetch_outline_row(&self, title: &str) -> Result<Option<CourseOutline>> {
        let row = sqlx::query(
            "SELECT title, instructor, course_link, lessons_json FROM catalog WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let lessons_json: String = row.get("lessons_json");
        let lessons: Vec<Lesson> = serde_json::from_str(&lessons_json).unwrap_or_default();

        Ok(Some(CourseOutline {
            title: row.get("title"),
            course_link: row.get("course_link"),
            instructor: row.get("instructor"),
            lessons,
        }))
    }

    /// Drop every row from both collections.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks_fts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM catalog").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Build an FTS5 MATCH expression from free text: terms are stripped to
/// alphanumerics, quoted, and OR-joined for recall. Returns `None` when no
/// searchable terms remain.
fn build_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
