//! Embedding backend abstraction, retry policy, and vector utilities.
//!
//! - [`EmbeddingBackend`]: a single-attempt embedding call against a remote
//!   model (implemented by [`OllamaClient`](crate::ollama::OllamaClient)).
//! - [`EmbeddingClient`]: wraps a backend with a bounded [`RetryPolicy`].
//! - [`cosine_similarity`]: similarity between two vectors.
//!
//! # Retry Strategy
//!
//! Every failure is retried until `max_attempts` is reached:
//! - Backoff is linear: `attempt × base_delay` (1s, 2s with the defaults)
//! - The final attempt's error is returned unmodified, so callers can still
//!   distinguish a timeout from an unreachable service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use crate::models::Embedding;

/// A remote embedding model, one request per call.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embed one text with a single request, no retries.
    async fn embed_once(&self, text: &str) -> Result<Embedding>;

    /// Liveness probe. Never errors.
    async fn health_check(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Embedding client with retry and linear backoff.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    policy: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Embed `text`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// The error of the final attempt, typically
    /// [`GatewayError::Timeout`](crate::error::GatewayError::Timeout) or
    /// [`GatewayError::Unavailable`](crate::error::GatewayError::Unavailable).
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut attempt = 1;
        loop {
            match self.backend.embed_once(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if attempt >= self.policy.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm vector.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
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
