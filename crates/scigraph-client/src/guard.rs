//! Guarded call path: limiter → breaker → endpoint
//!
//! Wrappers that impose admission control on an inner [`ChatModel`] or
//! [`Embedder`]. Callers hold the wrapper as the trait object, so nothing
//! downstream can reach the endpoint without passing both gates.

use crate::breaker::CircuitBreaker;
use crate::limiter::RateLimiter;
use async_trait::async_trait;
use scigraph_core::{ChatModel, Embedder, GenerationOptions, LlmError};
use std::sync::Arc;
use tracing::debug;

/// Chat endpoint behind a rate limiter and circuit breaker.
pub struct GuardedChatModel {
    inner: Arc<dyn ChatModel>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedChatModel {
    pub fn new(
        inner: Arc<dyn ChatModel>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            inner,
            limiter,
            breaker,
        }
    }
}

#[async_trait]
impl ChatModel for GuardedChatModel {
    async fn complete(&self, prompt: &str, opts: &GenerationOptions) -> Result<String, LlmError> {
        if !self.limiter.try_acquire() {
            debug!("chat call refused by rate limiter");
            return Err(LlmError::AdmissionRejected);
        }
        if !self.breaker.try_admit() {
            debug!("chat call refused by circuit breaker");
            return Err(LlmError::CircuitOpen);
        }
        match self.inner.complete(prompt, opts).await {
            Ok(text) => {
                self.breaker.record_success();
                Ok(text)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }
}

/// Embedding endpoint behind a rate limiter and circuit breaker.
pub struct GuardedEmbedder {
    inner: Arc<dyn Embedder>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedEmbedder {
    pub fn new(
        inner: Arc<dyn Embedder>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            inner,
            limiter,
            breaker,
        }
    }
}

#[async_trait]
impl Embedder for GuardedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if !self.limiter.try_acquire() {
            return Err(LlmError::AdmissionRejected);
        }
        if !self.breaker.try_admit() {
            return Err(LlmError::CircuitOpen);
        }
        match self.inner.embed_batch(texts).await {
            Ok(vectors) => {
                self.breaker.record_success();
                Ok(vectors)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
