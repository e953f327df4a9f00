//! External language-model capabilities: embedding and completion.
//!
//! Both are thin trait seams over the OpenAI-format HTTP API. When the
//! configured API key is "mock", in-process mock backends are wired instead
//! (deterministic embeddings, prompt-echoing completions) so the service
//! and its tests run without network access.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::errors::AppError;

pub const COMPLETION_MAX_TOKENS: u32 = 500;
pub const COMPLETION_TEMPERATURE: f32 = 0.5;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Upstream(format!("build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn post(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let url = format!("{}/{endpoint}", self.config.api_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("{endpoint} request failed: {e}")))?;

        if !res.status().is_success() {
            return Err(AppError::Upstream(format!(
                "{endpoint} returned {}",
                res.status()
            )));
        }
        res.json()
            .await
            .map_err(|e| AppError::Upstream(format!("{endpoint} response parse: {e}")))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let body = self
            .post(
                "embeddings",
                serde_json::json!({
                    "input": text,
                    "model": self.config.embedding_model,
                }),
            )
            .await?;

        let embedding: Vec<f32> = body["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| AppError::Upstream("embeddings response missing data".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        debug!(dim = embedding.len(), "Embedding generated");
        Ok(embedding)
    }
}

#[async_trait]
impl Completer for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let body = self
            .post(
                "chat/completions",
                serde_json::json!({
                    "model": self.config.completion_model,
                    "messages": [{"role": "user", "content": prompt}],
                    "max_tokens": COMPLETION_MAX_TOKENS,
                    "temperature": COMPLETION_TEMPERATURE,
                }),
            )
            .await?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| AppError::Upstream("completion response missing content".to_string()))
    }
}

/// Deterministic text-dependent embeddings: each byte contributes to one
/// dimension, and the vector is L2-normalized. Distinct texts map to
/// distinct directions, which is all nearest-neighbor tests need.
pub struct MockEmbedder {
    dim: usize,
}

impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut v = vec![0.0f32; self.dim];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dim] += f32::from(b) / 255.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

/// Echoes the prompt back, standing in for a model that repeats its context.
/// Answers therefore contain the grounding text, which the end-to-end tests
/// assert on.
pub struct MockCompleter;

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        Ok(prompt.trim().to_string())
    }
}

/// Wire the real client or the mocks depending on configuration.
pub fn build_backends(
    config: &OpenAiConfig,
) -> Result<(Arc<dyn Embedder>, Arc<dyn Completer>), AppError> {
    if config.api_key == "mock" {
        debug!("Using mock embedding/completion backends");
        Ok((
            Arc::new(MockEmbedder::new(config.embedding_dim)),
            Arc::new(MockCompleter),
        ))
    } else {
        let client = Arc::new(OpenAiClient::new(config.clone())?);
        Ok((client.clone(), client))
    }
}
