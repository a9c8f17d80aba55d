//! Multi-backend fallback router.
//!
//! Tries backends in a resolved order (caller override > preferred backend >
//! remaining registration order). Each backend sits behind its own circuit
//! breaker, and each individual call gets the retry/timeout envelope from
//! [`crate::llm::retry`]. The router answers with the first backend that
//! returns; if every backend is disabled, open, or exhausted it fails with an
//! aggregate error naming each backend's reason.

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::error::BackendError;
use crate::llm::breaker::BreakerRegistry;
use crate::llm::retry::{self, RetryPolicy};
use crate::llm::{BackendConfig, BreakerStatus, GenerationBackend, GenerationRequest, GenerationResponse};

struct RegisteredBackend {
    config: BackendConfig,
    backend: Arc<dyn GenerationBackend>,
}

/// Per-backend view combining config and breaker state.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub name: String,
    pub model: String,
    pub enabled: bool,
    pub breaker: Option<BreakerStatus>,
}

/// Circuit-breaker-protected fallback router over generation backends.
pub struct FallbackRouter {
    backends: Vec<RegisteredBackend>,
    preferred: Option<String>,
    breakers: Arc<BreakerRegistry>,
    policy: RetryPolicy,
}

impl FallbackRouter {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            backends: Vec::new(),
            preferred: None,
            breakers: Arc::new(BreakerRegistry::new(
                config.breaker_threshold,
                config.breaker_cooldown,
            )),
            policy: RetryPolicy {
                max_attempts: config.backend_max_attempts,
                backoff_base: config.backend_backoff_base,
                timeout: config.request_timeout,
            },
        }
    }

    /// Register a backend. Registration order is the default fallback order.
    pub fn register(&mut self, config: BackendConfig, backend: Arc<dyn GenerationBackend>) {
        tracing::info!(backend = %config.name, model = %config.model, "Registered generation backend");
        self.backends.push(RegisteredBackend { config, backend });
    }

    /// Set the backend tried first when the caller gives no override.
    pub fn set_preferred(&mut self, name: impl Into<String>) {
        self.preferred = Some(name.into());
    }

    /// The breaker registry, shared with status reporting.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Resolve the try order: override first, then preferred, then the rest
    /// in registration order. Unknown names are ignored.
    fn resolved_order(&self, override_backend: Option<&str>) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.backends.len());
        let mut push_by_name = |name: &str, order: &mut Vec<usize>| {
            if let Some(idx) = self.backends.iter().position(|b| b.config.name == name)
                && !order.contains(&idx)
            {
                order.push(idx);
            }
        };

        if let Some(name) = override_backend {
            push_by_name(name, &mut order);
        }
        if let Some(name) = &self.preferred {
            push_by_name(name, &mut order);
        }
        for idx in 0..self.backends.len() {
            if !order.contains(&idx) {
                order.push(idx);
            }
        }
        order
    }

    /// Generate text, trying backends in resolved order until one succeeds.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        override_backend: Option<&str>,
    ) -> Result<GenerationResponse, BackendError> {
        if self.backends.is_empty() {
            return Err(BackendError::NoBackends);
        }

        let mut failures: Vec<(String, String)> = Vec::new();

        for idx in self.resolved_order(override_backend) {
            let registered = &self.backends[idx];
            let name = registered.config.name.clone();

            if !registered.config.enabled {
                failures.push((name, BackendError::Disabled {
                    backend: registered.config.name.clone(),
                }
                .to_string()));
                continue;
            }

            if let Err(remaining) = self.breakers.check(&name).await {
                tracing::debug!(backend = %name, ?remaining, "Skipping backend: circuit open");
                failures.push((
                    name.clone(),
                    BackendError::CircuitOpen {
                        backend: name,
                        remaining,
                    }
                    .to_string(),
                ));
                continue;
            }

            let backend = registered.backend.clone();
            let result = retry::call_with_retry(&name, self.policy, || {
                let backend = backend.clone();
                async move { backend.generate(request).await }
            })
            .await;

            match result {
                Ok(response) => {
                    self.breakers.record_success(&name).await;
                    tracing::info!(
                        backend = %name,
                        model = %response.model,
                        "Generation served"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    // One breaker failure per router call, whether the retry
                    // budget was exhausted or the error was non-retryable.
                    self.breakers.record_failure(&name).await;
                    tracing::warn!(backend = %name, error = %e, "Backend failed, falling through");
                    failures.push((name, e.to_string()));
                }
            }
        }

        Err(BackendError::FallbackExhausted { failures })
    }

    /// Per-backend status for introspection.
    pub async fn status(&self) -> Vec<BackendStatus> {
        let breaker_status = self.breakers.status().await;
        self.backends
            .iter()
            .map(|b| BackendStatus {
                name: b.config.name.clone(),
                model: b.config.model.clone(),
                enabled: b.config.enabled,
                breaker: breaker_status
                    .iter()
                    .find(|s| s.backend == b.config.name)
                    .cloned(),
            })
            .collect()
    }
}
