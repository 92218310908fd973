//! Embedding service: batched calls, content-addressed cache, vector math
//!
//! The cache keys on the sha256 of the input text, so identical text never
//! hits the endpoint twice while the cache is enabled. Batches preserve
//! input order; empty input returns empty output without a call.

use parking_lot::Mutex;
use scigraph_core::{Embedder, LlmError, StoreError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Batched embedding front-end with a content-addressed cache.
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    cache: Mutex<HashMap<[u8; 32], Vec<f32>>>,
    cache_enabled: Mutex<bool>,
    batch_size: usize,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            cache: Mutex::new(HashMap::new()),
            cache_enabled: Mutex::new(true),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        *self.cache_enabled.lock() = enabled;
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn content_key(text: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.finalize().into()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut result = self.embed_many(&[text.to_string()]).await?;
        Ok(result.pop().unwrap_or_default())
    }

    /// Embed many texts, preserving input order. Cached texts are served
    /// locally; only misses go to the endpoint, chunked by `batch_size`.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let use_cache = *self.cache_enabled.lock();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        if use_cache {
            let cache = self.cache.lock();
            for (i, text) in texts.iter().enumerate() {
                match cache.get(&Self::content_key(text)) {
                    Some(vector) => results[i] = Some(vector.clone()),
                    None => misses.push(i),
                }
            }
        } else {
            misses = (0..texts.len()).collect();
        }

        debug!(
            total = texts.len(),
            cached = texts.len() - misses.len(),
            "embedding batch"
        );

        for chunk in misses.chunks(self.batch_size) {
            let inputs: Vec<String> = chunk.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.embedder.embed_batch(&inputs).await?;
            if vectors.len() != inputs.len() {
                return Err(LlmError::InvalidResponse(format!(
                    "requested {} embeddings, got {}",
                    inputs.len(),
                    vectors.len()
                )));
            }
            if use_cache {
                let mut cache = self.cache.lock();
                for (text, vector) in inputs.iter().zip(&vectors) {
                    cache.insert(Self::content_key(text), vector.clone());
                }
            }
            for (&i, vector) in chunk.iter().zip(vectors) {
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}

// ============================================================================
// Vector Math
// ============================================================================

/// Unit-normalize a vector. The zero vector is returned unchanged rather
/// than dividing by zero.
pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

/// Cosine similarity. Length mismatch is a fatal argument error, not a
/// silent zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, StoreError> {
    if a.len() != b.len() {
        return Err(StoreError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}
