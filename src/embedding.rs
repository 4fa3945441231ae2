//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and the concrete backends:
//! - **[`DisabledProvider`]** — returns errors; keyword search still works.
//! - **[`OpenAIProvider`]** — calls the OpenAI embeddings API with batching,
//!   retry, and backoff.
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/embed`
//!   endpoint.
//!
//! Also provides the vector helpers used by the store:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].
//!
//! # Retry Strategy
//!
//! The hosted providers use exponential backoff for transient errors:
//! HTTP 429 and 5xx retry; other 4xx fail immediately; network errors retry.
//! Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5).

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Interface all embedding backends implement. The embedding computation
/// itself is performed by [`embed_texts`] (kept as a free function due to
/// async trait limitations).
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
}

/// Embed a batch of texts using the configured provider.
pub async fn embed_texts(
    _provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "openai" => embed_openai(config, texts).await,
        "ollama" => embed_ollama(config, texts).await,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single text (e.g. a search query or a course title).
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_texts(provider, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Disabled Provider ============

/// A no-op provider used when `embedding.provider = "disabled"`. Any attempt
/// to embed fails; the store falls back to its keyword channel.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_openai_response(&json);
                }

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "OpenAI API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("OpenAI API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance (`POST /api/embed` on the
/// configured URL, default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

async fn embed_ollama(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let url = config.url.as_deref().unwrap_or("http://localhost:11434");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(format!("{}/api/embed", url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_ollama_response(&json);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "Ollama API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("Ollama API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed after retries")))
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

/// Create the appropriate [`EmbeddingProvider`] for the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn disabled_provider_fails_to_embed() {
        let config = EmbeddingConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = rt
            .block_on(embed_query(provider.as_ref(), &config, "hello"))
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn parse_openai_response_extracts_vectors() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert!((vecs[1][0] - 0.3).abs() < 1e-6);
    }
}
