use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub docs: DocsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> i64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Maximum retained (query, answer) exchanges per session.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

fn default_max_history() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Hosted model identifier (e.g. `claude-sonnet-4-20250514`).
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the API credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f64,
    /// Cap on sequential tool-calling rounds before a final no-tools call.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    800
}
fn default_max_tool_rounds() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Directory of frontend assets served at `/`.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DocsConfig {
    /// Folder of course documents ingested at server startup.
    #[serde(default)]
    pub folder: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }

    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }

    if config.session.max_history == 0 {
        anyhow::bail!("session.max_history must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.generation.model.is_empty() {
        anyhow::bail!("generation.model must not be empty");
    }
    if config.generation.max_tool_rounds == 0 {
        anyhow::bail!("generation.max_tool_rounds must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("coursebot.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[db]
path = "/tmp/coursebot.sqlite"

[generation]
model = "claude-sonnet-4-20250514"

[server]
bind = "127.0.0.1:8000"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), MINIMAL);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 800);
        assert_eq!(cfg.chunking.chunk_overlap, 100);
        assert_eq!(cfg.retrieval.max_results, 5);
        assert_eq!(cfg.session.max_history, 2);
        assert_eq!(cfg.generation.max_tool_rounds, 2);
        assert_eq!(cfg.generation.max_tokens, 800);
        assert_eq!(cfg.generation.temperature, 0.0);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
            MINIMAL
        );
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n[embedding]\nprovider = \"mystery\"\nmodel = \"m\"\ndims = 8\n",
            MINIMAL
        );
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }
}
