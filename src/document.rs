//! Course document loader and positional chunker.
//!
//! Course files follow a fixed header convention:
//!
//! ```text
//! Course Title: Building Toward Computer Use
//! Course Link: https://example.com/course
//! Course Instructor: Colt Steele
//!
//! Lesson 0: Introduction
//! Lesson Link: https://example.com/lesson0
//! ...lesson body...
//!
//! Lesson 1: Setup
//! ...
//! ```
//!
//! Malformed input (no recognizable title) is a hard error that propagates
//! to the caller. Body text is split into fixed-size character windows with
//! fixed character overlap; the boundary policy is purely positional.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::extract;
use crate::models::{Course, CourseChunk, Lesson};

/// Parse a course file (txt/md/pdf/docx) into a course plus its chunks.
pub fn parse_course_document(
    path: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<(Course, Vec<CourseChunk>)> {
    let text = read_document_text(path)
        .with_context(|| format!("Failed to read course document: {}", path.display()))?;
    parse_course_text(&text, chunk_size, chunk_overlap)
}

/// Read a document body as plain text, extracting from PDF/DOCX if needed.
fn read_document_text(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let bytes = std::fs::read(path)?;
            Ok(extract::extract_text(&bytes, extract::MIME_PDF)?)
        }
        "docx" => {
            let bytes = std::fs::read(path)?;
            Ok(extract::extract_text(&bytes, extract::MIME_DOCX)?)
        }
        _ => Ok(std::fs::read_to_string(path)?),
    }
}

/// Parse already-extracted course text.
pub fn parse_course_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<(Course, Vec<CourseChunk>)> {
    let lines: Vec<&str> = text.lines().collect();

    let mut title: Option<String> = None;
    let mut course_link: Option<String> = None;
    let mut instructor: Option<String> = None;

    // Header: the leading run of recognized header lines (and blanks). It
    // ends at the first lesson marker or the first prose line, so markerless
    // documents keep their body.
    let mut body_start = lines.len();
    for (i, line) in lines.iter().enumerate() {
        if parse_lesson_marker(line).is_some() {
            body_start = i;
            break;
        }
        let trimmed = line.trim();
        if let Some(value) = strip_prefix_ci(trimmed, "Course Title:") {
            title = non_empty(value);
        } else if let Some(value) = strip_prefix_ci(trimmed, "Course Link:") {
            course_link = non_empty(value);
        } else if let Some(value) = strip_prefix_ci(trimmed, "Course Instructor:") {
            instructor = non_empty(value);
        } else if !trimmed.is_empty() {
            body_start = i;
            break;
        }
    }

    let title = match title {
        Some(t) => t,
        None => bail!("Malformed course document: missing 'Course Title:' header"),
    };

    // Body: lesson markers delimit lesson texts; anything before the first
    // marker (or a file with no markers at all) is lesson-less content.
    let mut lessons: Vec<Lesson> = Vec::new();
    let mut segments: Vec<(Option<i64>, String)> = Vec::new();
    let mut current_lesson: Option<i64> = None;
    let mut current_text = String::new();
    let mut expect_lesson_link = false;

    for line in &lines[body_start..] {
        if let Some((number, lesson_title)) = parse_lesson_marker(line) {
            if !current_text.trim().is_empty() {
                segments.push((current_lesson, std::mem::take(&mut current_text)));
            } else {
                current_text.clear();
            }
            lessons.push(Lesson {
                number,
                title: lesson_title,
                link: None,
            });
            current_lesson = Some(number);
            expect_lesson_link = true;
            continue;
        }

        if expect_lesson_link {
            expect_lesson_link = false;
            if let Some(link) = strip_prefix_ci(line.trim(), "Lesson Link:") {
                if let Some(last) = lessons.last_mut() {
                    last.link = non_empty(link);
                }
                continue;
            }
        }

        if !current_text.is_empty() {
            current_text.push('\n');
        }
        current_text.push_str(line);
    }
    if !current_text.trim().is_empty() {
        segments.push((current_lesson, current_text));
    }

    let course = Course {
        title: title.clone(),
        course_link,
        instructor,
        lessons,
    };

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    for (lesson_number, segment) in &segments {
        for (start_offset, window) in chunk_text(segment.trim(), chunk_size, chunk_overlap)? {
            chunks.push(CourseChunk {
                content: window,
                course_title: title.clone(),
                lesson_number: *lesson_number,
                chunk_index,
                start_offset,
            });
            chunk_index += 1;
        }
    }

    Ok((course, chunks))
}

/// Split text into fixed-size character windows with fixed character overlap.
/// Returns `(char_offset, window)` pairs; offsets advance by
/// `chunk_size - overlap` so consecutive windows share `overlap` characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<(usize, String)>> {
    if overlap >= chunk_size {
        bail!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap,
            chunk_size
        );
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - overlap;
    let mut windows = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(chars.len());
        windows.push((start, chars[start..end].iter().collect::<String>()));
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(windows)
}

/// Recognize `Lesson N: Title` markers. Returns the lesson number and title.
fn parse_lesson_marker(line: &str) -> Option<(i64, String)> {
    let rest = strip_prefix_ci(line.trim(), "Lesson ")?;
    let colon = rest.find(':')?;
    let number: i64 = rest[..colon].trim().parse().ok()?;
    let title = rest[colon + 1..].trim().to_string();
    Some((number, title))
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(line[prefix.len()..].trim())
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
