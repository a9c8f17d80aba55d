//! Error types for the research orchestration core.

use std::time::Duration;

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Generation backend errors, classified for retry and breaker handling.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Backend {backend} auth/config error: {reason}")]
    AuthOrConfig { backend: String, reason: String },

    #[error("Backend {backend} transient failure: {reason}")]
    Transient { backend: String, reason: String },

    #[error("Backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("Circuit open for backend {backend}, {remaining:?} of cooldown remaining")]
    CircuitOpen {
        backend: String,
        remaining: Duration,
    },

    #[error("Backend {backend} is disabled")]
    Disabled { backend: String },

    #[error("All backends exhausted: {}", format_failures(.failures))]
    FallbackExhausted { failures: Vec<(String, String)> },

    #[error("No generation backends registered")]
    NoBackends,
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(backend, reason)| format!("{backend}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl BackendError {
    /// Whether a retry of the same backend could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Classify a raw backend failure message into the error taxonomy.
    ///
    /// Messages indicating a missing key, unauthorized access, or an
    /// uninitialized client are auth/config problems and must not be retried.
    pub fn classify(backend: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let lower = reason.to_lowercase();
        let auth_markers = [
            "api key",
            "missing key",
            "unauthorized",
            "not initialized",
            "uninitialized",
            "invalid credential",
            "forbidden",
        ];
        if auth_markers.iter().any(|m| lower.contains(m)) {
            Self::AuthOrConfig {
                backend: backend.to_string(),
                reason,
            }
        } else {
            Self::Transient {
                backend: backend.to_string(),
                reason,
            }
        }
    }
}

/// Worker contract errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Validation failed for worker {worker}: {reason}")]
    Validation { worker: String, reason: String },

    #[error("Worker {worker} timed out after {timeout:?}")]
    Timeout { worker: String, timeout: Duration },

    #[error("Worker {worker} execution failed: {reason}")]
    Execution { worker: String, reason: String },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl WorkerError {
    /// Validation errors abort immediately, everything else is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation { .. } => false,
            Self::Backend(e) => e.is_retryable(),
            _ => true,
        }
    }
}

/// Workflow scheduler setup errors.
///
/// These are the only failures that terminate a workflow; task-level failures
/// are captured as data in the phase result.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("No worker registered under name {name}")]
    UnknownWorker { name: String },

    #[error("Task {task} depends on unknown worker {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Dependency cycle involving worker {name}")]
    DependencyCycle { name: String },

    #[error("Task {task} cannot wait on {dependency}: it is scheduled later in the phase")]
    UnsatisfiableDependency { task: String, dependency: String },

    #[error("Phase {phase} declared out of order")]
    OutOfOrderPhase { phase: String },
}

/// Retrieval/embedding errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {reason}")]
    Embedding { reason: String },

    #[error("External index unavailable: {reason}")]
    IndexUnavailable { reason: String },

    #[error("Retrieval operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Invalid parameters for tool {name}: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Tool {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Tool {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

impl ToolError {
    /// Parameter problems are caller bugs and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExecutionFailed { .. } | Self::Timeout { .. })
    }
}

/// Result type alias for the orchestrator.
pub type Result<T> = std::result::Result<T, Error>;
