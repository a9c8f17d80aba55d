//! Retry/timeout envelope for backend calls.

use std::time::Duration;

use crate::error::BackendError;

/// Retry parameters for one backend call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub timeout: Duration,
}

/// Run `op` up to `max_attempts` times, racing each attempt against the
/// timeout and sleeping `backoff_base * 2^attempt` between attempts.
///
/// Non-retryable errors (auth/config) abort immediately. No sleep happens
/// after the final attempt.
pub(crate) async fn call_with_retry<T, F, Fut>(
    backend: &str,
    policy: RetryPolicy,
    op: F,
) -> Result<T, BackendError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut last_err = BackendError::Transient {
        backend: backend.to_string(),
        reason: "no attempts made".into(),
    };

    for attempt in 0..policy.max_attempts {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                tracing::debug!(
                    backend,
                    attempt = attempt + 1,
                    error = %e,
                    "Backend attempt failed"
                );
                last_err = e;
            }
            Err(_) => {
                tracing::debug!(backend, attempt = attempt + 1, "Backend attempt timed out");
                last_err = BackendError::Timeout {
                    backend: backend.to_string(),
                    timeout: policy.timeout,
                };
            }
        }

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.backoff_base * 2u32.pow(attempt)).await;
        }
    }

    Err(last_err)
}
