//! Generation backends and the resilience router.
//!
//! Backends implement [`GenerationBackend`] and are registered with the
//! [`FallbackRouter`], which isolates each behind its own circuit breaker and
//! wraps every call in a retry/timeout envelope. The router tries backends in
//! a resolved order until one answers.

pub mod breaker;
pub mod extract;
pub mod failover;
pub(crate) mod retry;

pub use breaker::{BreakerRegistry, BreakerStatus, CircuitBreaker};
pub use extract::{extract_json_object, parse_structured, parse_structured_or_default};
pub use failover::{BackendStatus, FallbackRouter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// A text generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// The user prompt.
    pub prompt: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Token accounting for a generation call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A completed generation, naming the backend and model that served it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// Static configuration for a registered backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend name (unique within the router).
    pub name: String,
    /// Model identifier passed through to the backend.
    pub model: String,
    /// API key, if the backend needs one.
    pub api_key: Option<secrecy::SecretString>,
    /// Disabled backends are skipped by the router.
    pub enabled: bool,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            api_key: None,
            enabled: true,
        }
    }

    pub fn with_api_key(mut self, key: secrecy::SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A text generation backend.
///
/// Implementations live outside the core (HTTP clients, local models). Errors
/// should carry enough message text for [`BackendError::classify`] to sort
/// auth/config problems from transient ones.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name, matching its [`BackendConfig`].
    fn name(&self) -> &str;

    /// Generate text for the request.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, BackendError>;
}

/// Scripted backend for tests: pops one outcome per call, then repeats the
/// last. Counts invocations.
pub struct MockBackend {
    name: String,
    outcomes: std::sync::Mutex<Vec<Result<String, BackendError>>>,
    calls: std::sync::atomic::AtomicU32,
}

impl MockBackend {
    pub fn new(name: impl Into<String>, outcomes: Vec<Result<String, BackendError>>) -> Self {
        Self {
            name: name.into(),
            outcomes: std::sync::Mutex::new(outcomes),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Backend that always answers with `text`.
    pub fn always_ok(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, vec![Ok(text.into())])
    }

    /// Backend that always fails with a transient error.
    pub fn always_fail(name: impl Into<String>) -> Self {
        let name = name.into();
        let err = BackendError::Transient {
            backend: name.clone(),
            reason: "mock failure".into(),
        };
        Self::new(name, vec![Err(err)])
    }

    /// Number of times `generate` was invoked.
    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationResponse, BackendError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let outcome = {
            let mut outcomes = self
                .outcomes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Ok(String::new()))
            }
        };
        outcome.map(|text| GenerationResponse {
            text,
            provider: self.name.clone(),
            model: "mock".into(),
            usage: TokenUsage::default(),
        })
    }
}
