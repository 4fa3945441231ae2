use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn coursebot_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("coursebot");
    path
}

const ML_COURSE: &str = "\
Course Title: Introduction to Machine Learning
Course Link: https://example.com/courses/ml
Course Instructor: Dr. Ada Smith

Lesson 1: What is Machine Learning
Lesson Link: https://example.com/courses/ml/1
Machine learning lets computers learn patterns from data instead of following \
hand-written rules. Training data quality matters more than algorithm choice \
in most practical settings.

Lesson 2: Supervised Learning
Supervised learning fits a model to labeled examples. Classification predicts \
discrete categories while regression predicts continuous values. Overfitting \
happens when a model memorizes the training set.
";

const RAG_COURSE: &str = "\
Course Title: Building RAG Chatbots
Course Link: https://example.com/courses/rag
Course Instructor: Jane Doe

Lesson 1: Retrieval Basics
Retrieval augmented generation combines a search index with a language model. \
The index supplies grounding passages and the model writes the answer.

Lesson 2: Chunking Strategies
Documents are split into overlapping chunks so retrieval can return focused \
passages. Chunk size trades recall against context budget.
";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(docs_dir.join("ml_course.txt"), ML_COURSE).unwrap();
    fs::write(docs_dir.join("rag_course.txt"), RAG_COURSE).unwrap();
    // Unsupported extension, must be ignored by folder ingestion.
    fs::write(docs_dir.join("notes.json"), "{\"not\": \"a course\"}").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/coursebot.sqlite"

[chunking]
chunk_size = 200
chunk_overlap = 40

[generation]
model = "claude-sonnet-4-20250514"

[server]
bind = "127.0.0.1:7332"
"#,
        root.display()
    );

    let config_path = config_dir.join("coursebot.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_coursebot(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = coursebot_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run coursebot binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn docs_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("docs")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_coursebot(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_coursebot(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_coursebot(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_folder_indexes_courses() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 2 courses"));
}

#[test]
fn test_reingest_skips_existing_courses() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);

    let (stdout, _, success) = run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Indexed 0 courses"));

    let (stdout, _, _) = run_coursebot(&config_path, &["courses"]);
    assert!(stdout.contains("2 courses indexed"));
}

#[test]
fn test_ingest_clear_drops_previous_index() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);

    let (stdout, _, success) =
        run_coursebot(&config_path, &["ingest", docs.to_str().unwrap(), "--clear"]);
    assert!(success);
    assert!(stdout.contains("Indexed 2 courses"));
}

#[test]
fn test_ingest_single_file() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    let file = docs.join("ml_course.txt");
    let (stdout, stderr, success) =
        run_coursebot(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 'Introduction to Machine Learning'"));
}

#[test]
fn test_search_finds_course_content() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);

    let (stdout, stderr, success) = run_coursebot(&config_path, &["search", "overfitting"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Introduction to Machine Learning"));
}

#[test]
fn test_search_resolves_partial_course_name() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);

    let (stdout, _, success) = run_coursebot(
        &config_path,
        &["search", "chunking", "--course", "RAG Chatbots"],
    );
    assert!(success);
    assert!(stdout.contains("Building RAG Chatbots"));
    assert!(!stdout.contains("Introduction to Machine Learning"));
}

#[test]
fn test_search_unknown_course_reports_miss() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);

    let (stdout, _, success) = run_coursebot(
        &config_path,
        &["search", "anything", "--course", "Quantum Basket Weaving"],
    );
    assert!(success);
    assert!(stdout.contains("No course found matching 'Quantum Basket Weaving'"));
}

#[test]
fn test_search_lesson_filter() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);

    // "patterns" only appears in ML lesson 1; filtering to lesson 2 must miss.
    let (stdout, _, success) = run_coursebot(
        &config_path,
        &["search", "patterns", "--course", "Machine Learning", "--lesson", "2"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_courses_lists_titles() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    run_coursebot(&config_path, &["init"]);
    run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);

    let (stdout, _, success) = run_coursebot(&config_path, &["courses"]);
    assert!(success);
    assert!(stdout.contains("Introduction to Machine Learning"));
    assert!(stdout.contains("Building RAG Chatbots"));
}

#[test]
fn test_malformed_document_fails_single_file_ingest() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    let bad = docs.join("broken.txt");
    fs::write(&bad, "This file has no course header at all.\nJust prose.\n").unwrap();

    run_coursebot(&config_path, &["init"]);
    let (_, stderr, success) = run_coursebot(&config_path, &["ingest", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Course Title"));
}

#[test]
fn test_malformed_document_skipped_in_folder_ingest() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_dir(&config_path);

    fs::write(
        docs.join("broken.txt"),
        "This file has no course header at all.\n",
    )
    .unwrap();

    run_coursebot(&config_path, &["init"]);
    let (stdout, _, success) = run_coursebot(&config_path, &["ingest", docs.to_str().unwrap()]);
    assert!(success, "folder ingest should survive one bad file");
    assert!(stdout.contains("Indexed 2 courses"));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad_config = tmp.path().join("bad.toml");
    fs::write(
        &bad_config,
        r#"[db]
path = "/tmp/x.sqlite"

[chunking]
chunk_size = 100
chunk_overlap = 150

[generation]
model = "claude-sonnet-4-20250514"

[server]
bind = "127.0.0.1:7333"
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_coursebot(&bad_config, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}
