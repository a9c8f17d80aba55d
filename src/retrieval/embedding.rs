//! Embedding providers with a deterministic hashing fallback.
//!
//! Providers are tried in order, each time-boxed. Any error, timeout, or
//! malformed vector falls through; the hashing fallback always produces a
//! vector, so indexing can never stall the pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RetrievalError;

/// An embedding backend. May error or time out.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Embed `text` into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// Ordered provider chain with a hashing fallback of last resort.
pub struct EmbeddingChain {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
    dimension: usize,
    timeout: Duration,
}

impl EmbeddingChain {
    pub fn new(dimension: usize, timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            dimension,
            timeout,
        }
    }

    /// Append a provider to the chain.
    pub fn push(&mut self, provider: Arc<dyn EmbeddingProvider>) {
        self.providers.push(provider);
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed `text`. Infallible: falls back to [`hash_embedding`] when every
    /// provider errors, times out, or returns a malformed vector.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        for provider in &self.providers {
            match tokio::time::timeout(self.timeout, provider.embed(text)).await {
                Ok(Ok(vector)) => {
                    if vector.len() == self.dimension && vector.iter().all(|v| v.is_finite()) {
                        return vector;
                    }
                    tracing::warn!(
                        provider = provider.name(),
                        got = vector.len(),
                        want = self.dimension,
                        "Malformed embedding, trying next provider"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Embedding provider failed");
                }
                Err(_) => {
                    tracing::warn!(provider = provider.name(), "Embedding provider timed out");
                }
            }
        }
        hash_embedding(text, self.dimension)
    }
}

/// Deterministic hashing-based embedding.
///
/// FNV-1a over whitespace/alphanumeric tokens, bucketed into `dimension`
/// slots and L2-normalized. Not semantically meaningful, but stable across
/// runs, which keeps cosine comparisons self-consistent.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension.max(1)];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        let bucket = (hash % vector.len() as u64) as usize;
        // Sign from a second hash bit keeps buckets from only accumulating.
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}
