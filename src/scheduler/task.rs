//! Task and phase types for the workflow scheduler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The fixed workflow phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Discovery,
    Analysis,
    Synthesis,
    QualityAssurance,
}

impl ResearchPhase {
    pub const ALL: [Self; 4] = [
        Self::Discovery,
        Self::Analysis,
        Self::Synthesis,
        Self::QualityAssurance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Analysis => "analysis",
            Self::Synthesis => "synthesis",
            Self::QualityAssurance => "quality_assurance",
        }
    }
}

impl std::fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How tasks within one phase are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// All tasks launch concurrently; the phase settles when every task is
    /// terminal. One task's failure never aborts its siblings.
    Parallel,
    /// Tasks run one at a time in ascending priority order (stable on ties),
    /// each gated on its declared dependencies reaching a terminal state.
    Sequential,
}

/// Declarative description of one task within a phase.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Registered worker to run.
    pub worker: String,
    /// Free-form task kind tag, passed through to the worker input.
    pub kind: String,
    /// Lower runs earlier in sequential phases.
    pub priority: i32,
    /// Worker names (same phase) that must be terminal before this runs.
    pub depends_on: Vec<String>,
    /// Extra parameters merged into the worker input.
    pub params: Value,
}

impl TaskSpec {
    pub fn new(worker: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            kind: kind.into(),
            priority: 0,
            depends_on: Vec::new(),
            params: Value::Null,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, worker: impl Into<String>) -> Self {
        self.depends_on.push(worker.into());
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// One phase of a workflow plan.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub phase: ResearchPhase,
    pub policy: ExecutionPolicy,
    pub tasks: Vec<TaskSpec>,
}

impl PhasePlan {
    pub fn parallel(phase: ResearchPhase, tasks: Vec<TaskSpec>) -> Self {
        Self {
            phase,
            policy: ExecutionPolicy::Parallel,
            tasks,
        }
    }

    pub fn sequential(phase: ResearchPhase, tasks: Vec<TaskSpec>) -> Self {
        Self {
            phase,
            policy: ExecutionPolicy::Sequential,
            tasks,
        }
    }
}

/// Lifecycle status of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Both success and captured failure count as done for gating.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Terminal result of one task. Failures are data, not exceptions, at this
/// boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TaskOutcome {
    Completed(Value),
    #[serde(rename_all = "camelCase")]
    Failed { error: String, worker_name: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The completed value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Completed(v) => Some(v),
            Self::Failed { .. } => None,
        }
    }
}

/// A task owned by the scheduler for its lifetime; folded into the phase
/// result and discarded once the phase settles.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub id: Uuid,
    pub worker: String,
    pub kind: String,
    pub input: Value,
    pub priority: i32,
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub outcome: Option<TaskOutcome>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkUnit {
    pub fn from_spec(spec: &TaskSpec, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            worker: spec.worker.clone(),
            kind: spec.kind.clone(),
            input,
            priority: spec.priority,
            depends_on: spec.depends_on.clone(),
            status: TaskStatus::Pending,
            outcome: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, outcome: TaskOutcome) {
        self.status = if outcome.is_success() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }
}

/// Ordered, single-pass progress events emitted while a workflow runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    WorkflowStarted { target: String },
    PhaseStarted { phase: ResearchPhase },
    TaskCompleted {
        phase: ResearchPhase,
        worker: String,
        success: bool,
    },
    PhaseCompleted { phase: ResearchPhase },
    WorkflowCompleted,
    WorkflowError { error: String },
}

/// Results of one settled phase, keyed by worker name.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub phase: ResearchPhase,
    pub results: BTreeMap<String, TaskOutcome>,
}

/// Nested result map of a finished workflow: phase → worker → outcome.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub target: String,
    pub phases: Vec<PhaseResult>,
}

impl WorkflowReport {
    pub fn phase(&self, phase: ResearchPhase) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// Union of every completed result across all phases, keyed by worker.
    /// Later phases win on name collisions.
    pub fn completed_union(&self) -> serde_json::Map<String, Value> {
        let mut union = serde_json::Map::new();
        for phase in &self.phases {
            for (worker, outcome) in &phase.results {
                if let Some(value) = outcome.value() {
                    union.insert(worker.clone(), value.clone());
                }
            }
        }
        union
    }
}
