//! Per-worker execution statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Immutable view of a worker's statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub avg_duration: Duration,
    /// completed / (completed + failed); 0 before the first run.
    pub success_rate: f64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Execution statistics, owned exclusively by one worker harness and mutated
/// only from its completion handler.
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: u64,
    failed: u64,
    avg_duration_ms: f64,
    success_rate: f64,
    last_run_at: Option<DateTime<Utc>>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful terminal run.
    pub fn record_success(&mut self, duration: Duration) {
        self.completed += 1;
        self.update(duration);
    }

    /// Record a failed terminal run.
    pub fn record_failure(&mut self, duration: Duration) {
        self.failed += 1;
        self.update(duration);
    }

    fn update(&mut self, duration: Duration) {
        let total = (self.completed + self.failed) as f64;
        // Rolling average: avg += (x - avg) / n
        self.avg_duration_ms += (duration.as_secs_f64() * 1000.0 - self.avg_duration_ms) / total;
        self.success_rate = self.completed as f64 / total;
        self.last_run_at = Some(Utc::now());
    }

    /// Idempotent read of the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed,
            failed: self.failed,
            avg_duration: Duration::from_secs_f64(self.avg_duration_ms.max(0.0) / 1000.0),
            success_rate: self.success_rate,
            last_run_at: self.last_run_at,
        }
    }

    /// Clear all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
