//! Core data models for the course corpus.
//!
//! These types flow through ingestion (document → course + chunks), retrieval
//! (chunks back out of the index), and response assembly (source attributions
//! shown alongside an answer).

use serde::{Deserialize, Serialize};

/// A single lesson within a course. Owned by exactly one [`Course`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// A course parsed from one document. The title is the unique identifier
/// across the corpus; re-ingesting a known title is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    #[serde(default)]
    pub course_link: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// A fixed-size text window cut from a course document, the unit indexed
/// for semantic search.
#[derive(Debug, Clone)]
pub struct CourseChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<i64>,
    pub chunk_index: i64,
    /// Character offset of this window within the lesson body it was cut from.
    pub start_offset: usize,
}

/// One (query, answer) pair retained in a session's history window.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub query: String,
    pub answer: String,
}

/// Attribution for one retrieved chunk, captured transiently per query for
/// UI display. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Display label, e.g. `"Intro to MCP - Lesson 2"`.
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
}
