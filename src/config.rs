//! Configuration types.

use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Timeout for a single worker invocation.
    pub worker_timeout: Duration,
    /// Maximum attempts per worker invocation.
    pub worker_max_attempts: u32,
    /// Base delay for worker retry backoff (doubled per attempt).
    pub worker_backoff_base: Duration,
    /// Consecutive failures before a backend's circuit opens.
    pub breaker_threshold: u32,
    /// How long an open circuit fails fast before a probe is allowed.
    pub breaker_cooldown: Duration,
    /// Timeout for a single backend generation call.
    pub request_timeout: Duration,
    /// Maximum attempts per backend call.
    pub backend_max_attempts: u32,
    /// Base delay for backend retry backoff.
    pub backend_backoff_base: Duration,
    /// Time box for embedding calls.
    pub embed_timeout: Duration,
    /// Time box for external vector index calls.
    pub index_timeout: Duration,
    /// Capacity of the document LRU cache.
    pub document_cache_capacity: usize,
    /// Capacity of the search-result LRU cache.
    pub search_cache_capacity: usize,
    /// Maximum short-term entries retained per session.
    pub session_memory_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_secs(60),
            worker_max_attempts: 3,
            worker_backoff_base: Duration::from_millis(1000),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(120), // 2 minutes
            request_timeout: Duration::from_secs(30),
            backend_max_attempts: 3,
            backend_backoff_base: Duration::from_millis(1000),
            embed_timeout: Duration::from_secs(30),
            index_timeout: Duration::from_secs(30),
            document_cache_capacity: 100,
            search_cache_capacity: 50,
            session_memory_capacity: 200,
        }
    }
}

/// Per-tool execution policy.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    /// Maximum attempts per tool call.
    pub max_attempts: u32,
    /// Base delay for retry backoff.
    pub backoff_base: Duration,
    /// Minimum interval between calls to the same tool.
    pub min_call_interval: Duration,
    /// Timeout for a single tool attempt.
    pub timeout: Duration,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            min_call_interval: Duration::ZERO,
            timeout: Duration::from_secs(30),
        }
    }
}
