//! Worker contract: retry, timeout racing, and statistics around one unit of
//! domain logic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::OrchestratorConfig;
use crate::error::WorkerError;
use crate::worker::stats::{StatsSnapshot, WorkerStats};

/// One unit of research domain logic.
///
/// Implementations receive the task input (target, prior-phase context,
/// task parameters) and produce a JSON result. Validation problems should be
/// reported as [`WorkerError::Validation`] so the harness skips retries.
#[async_trait]
pub trait ResearchWorker: Send + Sync {
    /// Worker name, unique within a workflow.
    fn name(&self) -> &str;

    /// Execute the unit of work.
    async fn execute(&self, input: Value) -> Result<Value, WorkerError>;
}

/// Uniform execution wrapper applied to every worker.
///
/// Each attempt is spawned and raced against the configured timeout; on
/// timeout the spawned call is abandoned (it may still run to completion,
/// its result is discarded). Up to `worker_max_attempts` attempts with
/// exponential backoff, skipped entirely for validation errors. Statistics
/// are recorded on the terminal outcome of every invocation.
pub struct WorkerHarness {
    worker: Arc<dyn ResearchWorker>,
    timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    stats: Mutex<WorkerStats>,
}

impl WorkerHarness {
    pub fn new(worker: Arc<dyn ResearchWorker>, config: &OrchestratorConfig) -> Self {
        Self {
            worker,
            timeout: config.worker_timeout,
            max_attempts: config.worker_max_attempts.max(1),
            backoff_base: config.worker_backoff_base,
            stats: Mutex::new(WorkerStats::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.worker.name()
    }

    /// Run the worker with the full retry/timeout envelope.
    ///
    /// Exactly one terminal outcome per invocation: the returned `Result` is
    /// the only report, and stats are recorded once.
    pub async fn run(&self, input: Value) -> Result<Value, WorkerError> {
        let started = Instant::now();
        let result = self.run_attempts(input).await;

        let elapsed = started.elapsed();
        let mut stats = self.stats.lock().await;
        match &result {
            Ok(_) => stats.record_success(elapsed),
            Err(e) => {
                tracing::warn!(worker = self.name(), error = %e, "Worker invocation failed");
                stats.record_failure(elapsed);
            }
        }
        result
    }

    async fn run_attempts(&self, input: Value) -> Result<Value, WorkerError> {
        let mut last_err = WorkerError::Execution {
            worker: self.name().to_string(),
            reason: "no attempts made".into(),
        };

        for attempt in 0..self.max_attempts {
            let worker = self.worker.clone();
            let attempt_input = input.clone();
            let handle = tokio::spawn(async move { worker.execute(attempt_input).await });

            match tokio::time::timeout(self.timeout, handle).await {
                Ok(Ok(Ok(value))) => return Ok(value),
                Ok(Ok(Err(e))) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    tracing::debug!(
                        worker = self.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Worker attempt failed"
                    );
                    last_err = e;
                }
                Ok(Err(join_err)) => {
                    last_err = WorkerError::Execution {
                        worker: self.name().to_string(),
                        reason: format!("worker task panicked: {join_err}"),
                    };
                }
                Err(_) => {
                    // Dropping the JoinHandle abandons the attempt; the inner
                    // call keeps running and its result is discarded.
                    tracing::debug!(
                        worker = self.name(),
                        attempt = attempt + 1,
                        "Worker attempt timed out"
                    );
                    last_err = WorkerError::Timeout {
                        worker: self.name().to_string(),
                        timeout: self.timeout,
                    };
                }
            }

            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.backoff_base * 2u32.pow(attempt)).await;
            }
        }

        Err(last_err)
    }

    /// Current statistics (idempotent read).
    pub async fn stats(&self) -> StatsSnapshot {
        self.stats.lock().await.snapshot()
    }

    /// Explicit statistics reset.
    pub async fn reset_stats(&self) {
        self.stats.lock().await.reset();
    }
}
