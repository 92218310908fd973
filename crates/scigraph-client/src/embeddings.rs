//! Embedding client
//!
//! OpenAI-compatible `/embeddings` shape: list of input texts, fixed-
//! dimension float vectors back in `data[i].embedding`, input order
//! preserved.

use async_trait::async_trait;
use reqwest::Client;
use scigraph_core::{Embedder, LlmError};
use std::time::Duration;

/// Configuration for one embedding endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl EmbeddingClientConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            dimension,
            timeout_secs: 10,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingClientConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.config.base_url);
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.timeout_secs)
            } else {
                LlmError::Network(e.to_string())
            }
        })?;

        if response.status() == 429 {
            return Err(LlmError::RateLimited {
                retry_after_ms: 60_000,
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {error_text}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let rows = data["data"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("missing data array".into()))?;

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding: Vec<f32> = row["embedding"]
                .as_array()
                .ok_or_else(|| LlmError::InvalidResponse("missing embedding".into()))?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            if embedding.len() != self.config.dimension {
                return Err(LlmError::InvalidResponse(format!(
                    "expected dimension {}, got {}",
                    self.config.dimension,
                    embedding.len()
                )));
            }
            vectors.push(embedding);
        }

        if vectors.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
