//! Per-backend circuit breakers.
//!
//! A breaker opens after a fixed number of accumulated failures (no time
//! decay) and fails fast until the cooldown elapses. The first call after the
//! cooldown is a probe: success closes the breaker and zeroes the failure
//! counter, failure reopens it immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

/// Failure-isolation gate for one backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            failure_count: 0,
            last_failure_at: None,
            opened_at: None,
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// Returns the remaining cooldown when the breaker is open. Once the
    /// cooldown has elapsed a single probe call is permitted; the breaker
    /// stays marked open until that probe's outcome is recorded.
    pub fn check(&self) -> Result<(), Duration> {
        if let Some(opened_at) = self.opened_at {
            let elapsed = opened_at.elapsed();
            if elapsed < self.cooldown {
                return Err(self.cooldown - elapsed);
            }
        }
        Ok(())
    }

    /// Record a successful call: closes the breaker and resets the counter.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.opened_at = None;
        self.last_failure_at = None;
    }

    /// Record a failed call. Reaching the threshold opens the breaker; a
    /// failed probe after the cooldown reopens it from now.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_at = Some(Instant::now());
        if self.failure_count >= self.threshold {
            self.opened_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure_at(&self) -> Option<Instant> {
        self.last_failure_at
    }
}

/// Point-in-time view of one breaker, for introspection.
#[derive(Debug, Clone)]
pub struct BreakerStatus {
    pub backend: String,
    pub open: bool,
    pub failure_count: u32,
}

/// Process-wide registry: one breaker per backend name, each behind its own
/// mutex so parallel calls to different backends never contend.
pub struct BreakerRegistry {
    threshold: u32,
    cooldown: Duration,
    breakers: RwLock<HashMap<String, Arc<Mutex<CircuitBreaker>>>>,
}

impl BreakerRegistry {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    async fn breaker(&self, backend: &str) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(b) = self.breakers.read().await.get(backend) {
            return b.clone();
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(backend.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CircuitBreaker::new(self.threshold, self.cooldown)))
            })
            .clone()
    }

    /// Check whether `backend` may be called; `Err` carries the remaining
    /// cooldown.
    pub async fn check(&self, backend: &str) -> Result<(), Duration> {
        self.breaker(backend).await.lock().await.check()
    }

    pub async fn record_success(&self, backend: &str) {
        self.breaker(backend).await.lock().await.record_success();
    }

    pub async fn record_failure(&self, backend: &str) {
        let breaker = self.breaker(backend).await;
        let mut breaker = breaker.lock().await;
        breaker.record_failure();
        if breaker.is_open() {
            tracing::warn!(
                backend,
                failures = breaker.failure_count(),
                "Circuit breaker open"
            );
        }
    }

    pub async fn failure_count(&self, backend: &str) -> u32 {
        self.breaker(backend).await.lock().await.failure_count()
    }

    /// Snapshot of every known breaker.
    pub async fn status(&self) -> Vec<BreakerStatus> {
        let breakers = self.breakers.read().await;
        let mut out = Vec::with_capacity(breakers.len());
        for (name, breaker) in breakers.iter() {
            let breaker = breaker.lock().await;
            out.push(BreakerStatus {
                backend: name.clone(),
                open: breaker.is_open(),
                failure_count: breaker.failure_count(),
            });
        }
        out.sort_by(|a, b| a.backend.cmp(&b.backend));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_until_threshold() {
        let mut b = CircuitBreaker::new(5, Duration::from_secs(120));
        for _ in 0..4 {
            b.record_failure();
            assert!(b.check().is_ok());
        }
        b.record_failure();
        assert!(b.is_open());
        assert!(b.check().is_err());
    }

    #[test]
    fn success_resets_counter() {
        let mut b = CircuitBreaker::new(5, Duration::from_secs(120));
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.failure_count(), 0);
        assert!(!b.is_open());
    }

    #[test]
    fn probe_allowed_after_cooldown() {
        let mut b = CircuitBreaker::new(2, Duration::from_millis(0));
        b.record_failure();
        b.record_failure();
        assert!(b.is_open());
        // Zero cooldown: probe permitted immediately, breaker still open.
        assert!(b.check().is_ok());
        assert!(b.is_open());
    }

    #[test]
    fn failed_probe_reopens() {
        let mut b = CircuitBreaker::new(2, Duration::from_millis(0));
        b.record_failure();
        b.record_failure();
        assert!(b.check().is_ok());
        b.record_failure();
        assert!(b.is_open());
    }

    #[test]
    fn successful_probe_closes() {
        let mut b = CircuitBreaker::new(2, Duration::from_millis(0));
        b.record_failure();
        b.record_failure();
        assert!(b.check().is_ok());
        b.record_success();
        assert!(!b.is_open());
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test]
    async fn registry_tracks_backends_independently() {
        let reg = BreakerRegistry::new(2, Duration::from_secs(120));
        reg.record_failure("a").await;
        reg.record_failure("a").await;
        reg.record_failure("b").await;

        assert!(reg.check("a").await.is_err());
        assert!(reg.check("b").await.is_ok());

        let status = reg.status().await;
        assert_eq!(status.len(), 2);
        assert!(status[0].open);
        assert!(!status[1].open);
    }
}
