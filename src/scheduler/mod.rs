//! Task graph scheduler: phases, work units, and the workflow engine.

pub mod engine;
pub mod task;

pub use engine::WorkflowEngine;
pub use task::{
    ExecutionPolicy, PhasePlan, PhaseResult, ProgressEvent, ResearchPhase, TaskOutcome, TaskSpec,
    TaskStatus, WorkUnit, WorkflowReport,
};
