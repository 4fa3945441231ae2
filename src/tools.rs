//! Tools the generation model can call during a query.
//!
//! Each tool exposes a JSON schema in the Messages API `tools` format and an
//! `execute` method that turns validated parameters into plain text. The
//! search tool additionally tracks the sources behind its last answer so the
//! HTTP layer can surface them alongside the response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::SourceRef;
use crate::store::VectorStore;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool definition in the Messages API format, including `input_schema`.
    fn definition(&self) -> Value;

    /// Run the tool. Errors that should end the query propagate; conditions
    /// the model can recover from (no results, unknown course) are returned
    /// as text for it to relay.
    async fn execute(&self, params: &Value) -> Result<String>;

    /// Sources behind the most recent execution, if the tool tracks any.
    fn last_sources(&self) -> Vec<SourceRef> {
        Vec::new()
    }

    fn reset_sources(&self) {}
}

/// Semantic search over course content, with optional course and lesson
/// filters.
pub struct CourseSearchTool {
    store: Arc<VectorStore>,
    last_sources: Mutex<Vec<SourceRef>>,
}

impl CourseSearchTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self {
            store,
            last_sources: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn name(&self) -> &str {
        "search_course_content"
    }

    fn definition(&self) -> Value {
        json!({
            "name": "search_course_content",
            "description": "Search course materials with smart course name matching and lesson filtering",
            "input_schema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in the course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }
        })
    }

    async fn execute(&self, params: &Value) -> Result<String> {
        let query = match params.get("query").and_then(Value::as_str) {
            Some(q) => q,
            None => bail!("search_course_content requires a 'query' parameter"),
        };
        let course_name = params.get("course_name").and_then(Value::as_str);
        let lesson_number = params.get("lesson_number").and_then(Value::as_i64);

        let results = self
            .store
            .search(query, course_name, lesson_number, None)
            .await?;

        if let Some(error) = results.error {
            return Ok(error);
        }

        if results.is_empty() {
            let mut scope = String::new();
            if let Some(name) = course_name {
                scope.push_str(&format!(" in course '{}'", name));
            }
            if let Some(lesson) = lesson_number {
                scope.push_str(&format!(" in lesson {}", lesson));
            }
            return Ok(format!("No relevant content found{}.", scope));
        }

        let mut sources = Vec::with_capacity(results.hits.len());
        let mut sections = Vec::with_capacity(results.hits.len());

        for hit in &results.hits {
            let header = match hit.lesson_number {
                Some(n) => format!("{} - Lesson {}", hit.course_title, n),
                None => hit.course_title.clone(),
            };

            let url = match hit.lesson_number {
                Some(n) => self.store.get_lesson_link(&hit.course_title, n).await?,
                None => self.store.get_course_link(&hit.course_title).await?,
            };

            sources.push(SourceRef {
                text: header.clone(),
                url,
            });
            sections.push(format!("[{}]\n{}", header, hit.content));
        }

        {
            let mut tracked = self.last_sources.lock().unwrap_or_else(|e| e.into_inner());
            *tracked = sources;
        }

        Ok(sections.join("\n\n"))
    }

    fn last_sources(&self) -> Vec<SourceRef> {
        self.last_sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn reset_sources(&self) {
        self.last_sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Returns a course's full outline: link, instructor, and lesson list.
pub struct CourseOutlineTool {
    store: Arc<VectorStore>,
}

impl CourseOutlineTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn name(&self) -> &str {
        "get_course_outline"
    }

    fn definition(&self) -> Value {
        json!({
            "name": "get_course_outline",
            "description": "Get the full outline of a course: title, link, and complete lesson list",
            "input_schema": {
                "type": "object",
                "properties": {
                    "course_title": {
                        "type": "string",
                        "description": "Course title (partial matches work)"
                    }
                },
                "required": ["course_title"]
            }
        })
    }

    async fn execute(&self, params: &Value) -> Result<String> {
        let name = match params.get("course_title").and_then(Value::as_str) {
            Some(n) => n,
            None => bail!("get_course_outline requires a 'course_title' parameter"),
        };

        let outline = match self.store.get_course_outline(name).await? {
            Some(o) => o,
            None => return Ok(format!("No course found matching '{}'", name)),
        };

        let mut text = format!("Course: {}", outline.title);
        if let Some(link) = &outline.course_link {
            text.push_str(&format!("\nCourse Link: {}", link));
        }
        if let Some(instructor) = &outline.instructor {
            text.push_str(&format!("\nInstructor: {}", instructor));
        }
        text.push_str(&format!("\n\nLessons ({}):", outline.lessons.len()));
        for lesson in &outline.lessons {
            text.push_str(&format!("\n{}. {}", lesson.number, lesson.title));
        }

        Ok(text)
    }
}

/// Registry that owns the tools and dispatches model tool calls by name.
#[derive(Default)]
pub struct ToolManager {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// All tool definitions, in the shape the Messages API expects.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub async fn execute(&self, name: &str, params: &Value) -> Result<String> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(params).await,
            None => Ok(format!("Tool '{}' not found", name)),
        }
    }

    /// Sources tracked by any tool since the last reset.
    pub fn last_sources(&self) -> Vec<SourceRef> {
        self.tools
            .values()
            .flat_map(|t| t.last_sources())
            .collect()
    }

    pub fn reset_sources(&self) {
        for tool in self.tools.values() {
            tool.reset_sources();
        }
    }
}
