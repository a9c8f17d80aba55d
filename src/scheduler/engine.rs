//! Workflow engine: drives the fixed phase sequence over registered workers.
//!
//! Parallel phases fan out every task concurrently and settle them all;
//! sequential phases run tasks one at a time in priority order, gating each
//! on its dependencies through per-task completion channels (dependents wake
//! on completion rather than polling). Task failures are folded into the
//! phase result as data; only setup failures terminate the workflow.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};

use crate::config::OrchestratorConfig;
use crate::error::SchedulerError;
use crate::scheduler::task::{
    ExecutionPolicy, PhasePlan, PhaseResult, ProgressEvent, TaskOutcome, TaskSpec, TaskStatus,
    WorkUnit, WorkflowReport,
};
use crate::worker::{ResearchWorker, StatsSnapshot, WorkerHarness};

/// One logical controller per workflow target.
pub struct WorkflowEngine {
    config: OrchestratorConfig,
    workers: HashMap<String, Arc<WorkerHarness>>,
    events: broadcast::Sender<ProgressEvent>,
}

impl WorkflowEngine {
    pub fn new(config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            workers: HashMap::new(),
            events,
        }
    }

    /// Register a worker, wrapping it in the uniform execution harness.
    pub fn register_worker(&mut self, worker: Arc<dyn ResearchWorker>) {
        let name = worker.name().to_string();
        let harness = Arc::new(WorkerHarness::new(worker, &self.config));
        tracing::info!(worker = %name, "Registered worker");
        self.workers.insert(name, harness);
    }

    /// Subscribe to the ordered progress event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Statistics for one registered worker.
    pub async fn worker_stats(&self, name: &str) -> Option<StatsSnapshot> {
        match self.workers.get(name) {
            Some(harness) => Some(harness.stats().await),
            None => None,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Run a workflow to completion.
    ///
    /// Returns the nested phase → worker → outcome report. Task failures are
    /// captured inside the report; an `Err` here is a setup failure, mirrored
    /// by a terminal `WorkflowError` event.
    pub async fn run(
        &self,
        target: &str,
        plan: Vec<PhasePlan>,
    ) -> Result<WorkflowReport, SchedulerError> {
        self.emit(ProgressEvent::WorkflowStarted {
            target: target.to_string(),
        });

        if let Err(e) = self.validate(&plan) {
            tracing::error!(error = %e, "Workflow setup failed");
            self.emit(ProgressEvent::WorkflowError {
                error: e.to_string(),
            });
            return Err(e);
        }

        let mut report = WorkflowReport {
            target: target.to_string(),
            phases: Vec::with_capacity(plan.len()),
        };
        // Union of completed results from all prior phases, keyed by worker.
        let mut context = serde_json::Map::new();

        for phase_plan in plan {
            let phase = phase_plan.phase;
            tracing::info!(%phase, tasks = phase_plan.tasks.len(), "Phase starting");
            self.emit(ProgressEvent::PhaseStarted { phase });

            let units = self.build_units(target, &context, &phase_plan)?;
            let results = match phase_plan.policy {
                ExecutionPolicy::Parallel => self.run_parallel(phase, units).await,
                ExecutionPolicy::Sequential => self.run_sequential(phase, units).await,
            };

            for (worker, outcome) in &results {
                if let Some(value) = outcome.value() {
                    context.insert(worker.clone(), value.clone());
                }
            }

            tracing::info!(%phase, "Phase complete");
            self.emit(ProgressEvent::PhaseCompleted { phase });
            report.phases.push(PhaseResult { phase, results });
        }

        self.emit(ProgressEvent::WorkflowCompleted);
        Ok(report)
    }

    /// Resolve specs into work units with their harnesses.
    fn build_units(
        &self,
        target: &str,
        context: &serde_json::Map<String, Value>,
        phase_plan: &PhasePlan,
    ) -> Result<Vec<(WorkUnit, Arc<WorkerHarness>)>, SchedulerError> {
        phase_plan
            .tasks
            .iter()
            .map(|spec| {
                let harness = self
                    .workers
                    .get(&spec.worker)
                    .cloned()
                    .ok_or_else(|| SchedulerError::UnknownWorker {
                        name: spec.worker.clone(),
                    })?;
                let input = json!({
                    "target": target,
                    "kind": spec.kind,
                    "context": Value::Object(context.clone()),
                    "params": spec.params,
                });
                Ok((WorkUnit::from_spec(spec, input), harness))
            })
            .collect()
    }

    /// Parallel-independent phase: launch everything, settle everything.
    async fn run_parallel(
        &self,
        phase: crate::scheduler::task::ResearchPhase,
        units: Vec<(WorkUnit, Arc<WorkerHarness>)>,
    ) -> BTreeMap<String, TaskOutcome> {
        let tasks = units.into_iter().map(|(mut unit, harness)| async move {
            unit.start();
            let outcome = match harness.run(unit.input.clone()).await {
                Ok(value) => TaskOutcome::Completed(value),
                Err(e) => TaskOutcome::Failed {
                    error: e.to_string(),
                    worker_name: unit.worker.clone(),
                },
            };
            unit.finish(outcome.clone());
            unit
        });

        let mut results = BTreeMap::new();
        for unit in join_all(tasks).await {
            self.fold_unit(phase, unit, &mut results);
        }
        results
    }

    /// Sequential phase: ascending priority (stable on ties), each task gated
    /// on its dependencies reaching a terminal state.
    async fn run_sequential(
        &self,
        phase: crate::scheduler::task::ResearchPhase,
        mut units: Vec<(WorkUnit, Arc<WorkerHarness>)>,
    ) -> BTreeMap<String, TaskOutcome> {
        units.sort_by_key(|(unit, _)| unit.priority);

        // Per-task completion channels; dependents wake on terminal status.
        let mut status_senders: HashMap<String, watch::Sender<TaskStatus>> = HashMap::new();
        let mut status_receivers: HashMap<String, watch::Receiver<TaskStatus>> = HashMap::new();
        for (unit, _) in &units {
            let (tx, rx) = watch::channel(TaskStatus::Pending);
            status_senders.insert(unit.worker.clone(), tx);
            status_receivers.insert(unit.worker.clone(), rx);
        }

        let mut results = BTreeMap::new();
        for (mut unit, harness) in units {
            for dep in &unit.depends_on {
                if let Some(rx) = status_receivers.get(dep) {
                    let mut rx = rx.clone();
                    // Terminal means done for gating: success or captured
                    // failure both unblock dependents.
                    while !rx.borrow_and_update().is_terminal() {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                }
            }

            unit.start();
            let outcome = match harness.run(unit.input.clone()).await {
                Ok(value) => TaskOutcome::Completed(value),
                Err(e) => TaskOutcome::Failed {
                    error: e.to_string(),
                    worker_name: unit.worker.clone(),
                },
            };
            unit.finish(outcome.clone());

            if let Some(tx) = status_senders.get(&unit.worker) {
                let _ = tx.send(unit.status);
            }
            self.fold_unit(phase, unit, &mut results);
        }
        results
    }

    /// Fold a settled unit into the phase result and emit its completion.
    fn fold_unit(
        &self,
        phase: crate::scheduler::task::ResearchPhase,
        unit: WorkUnit,
        results: &mut BTreeMap<String, TaskOutcome>,
    ) {
        let outcome = unit.outcome.unwrap_or(TaskOutcome::Failed {
            error: "task never settled".into(),
            worker_name: unit.worker.clone(),
        });
        self.emit(ProgressEvent::TaskCompleted {
            phase,
            worker: unit.worker.clone(),
            success: outcome.is_success(),
        });
        results.insert(unit.worker, outcome);
    }

    /// Plan validation. Failures here are workflow setup errors.
    fn validate(&self, plan: &[PhasePlan]) -> Result<(), SchedulerError> {
        // Phases must follow the fixed declared order.
        let mut last_phase = None;
        for phase_plan in plan {
            if let Some(last) = last_phase
                && phase_plan.phase <= last
            {
                return Err(SchedulerError::OutOfOrderPhase {
                    phase: phase_plan.phase.to_string(),
                });
            }
            last_phase = Some(phase_plan.phase);
        }

        for phase_plan in plan {
            let names: HashSet<&str> = phase_plan
                .tasks
                .iter()
                .map(|t| t.worker.as_str())
                .collect();

            for task in &phase_plan.tasks {
                if !self.workers.contains_key(&task.worker) {
                    return Err(SchedulerError::UnknownWorker {
                        name: task.worker.clone(),
                    });
                }
                for dep in &task.depends_on {
                    if !names.contains(dep.as_str()) {
                        return Err(SchedulerError::UnknownDependency {
                            task: task.worker.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }

            Self::check_cycles(&phase_plan.tasks)?;

            if phase_plan.policy == ExecutionPolicy::Sequential {
                Self::check_ordering(&phase_plan.tasks)?;
            }
        }
        Ok(())
    }

    /// Depth-first cycle check over the same-phase dependency graph.
    fn check_cycles(tasks: &[TaskSpec]) -> Result<(), SchedulerError> {
        let deps: HashMap<&str, &Vec<String>> = tasks
            .iter()
            .map(|t| (t.worker.as_str(), &t.depends_on))
            .collect();

        fn visit<'a>(
            name: &'a str,
            deps: &HashMap<&'a str, &'a Vec<String>>,
            visiting: &mut HashSet<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<(), SchedulerError> {
            if done.contains(name) {
                return Ok(());
            }
            if !visiting.insert(name) {
                return Err(SchedulerError::DependencyCycle {
                    name: name.to_string(),
                });
            }
            if let Some(task_deps) = deps.get(name) {
                for dep in task_deps.iter() {
                    visit(dep, deps, visiting, done)?;
                }
            }
            visiting.remove(name);
            done.insert(name);
            Ok(())
        }

        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        for task in tasks {
            visit(&task.worker, &deps, &mut visiting, &mut done)?;
        }
        Ok(())
    }

    /// In a sequential phase every dependency must sort before its dependent,
    /// otherwise the gate would wait on a task that never runs first.
    fn check_ordering(tasks: &[TaskSpec]) -> Result<(), SchedulerError> {
        let mut sorted: Vec<&TaskSpec> = tasks.iter().collect();
        sorted.sort_by_key(|t| t.priority);

        let mut seen: HashSet<&str> = HashSet::new();
        for task in sorted {
            for dep in &task.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(SchedulerError::UnsatisfiableDependency {
                        task: task.worker.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            seen.insert(&task.worker);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::WorkerError;
    use crate::scheduler::task::ResearchPhase;

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            worker_timeout: Duration::from_millis(500),
            worker_backoff_base: Duration::from_millis(1),
            ..OrchestratorConfig::default()
        }
    }

    /// Worker that records a global start order and optionally fails.
    struct ProbeWorker {
        name: String,
        fail: bool,
        order: Arc<std::sync::Mutex<Vec<String>>>,
        delay: Duration,
    }

    impl ProbeWorker {
        fn ok(name: &str, order: &Arc<std::sync::Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail: false,
                order: order.clone(),
                delay: Duration::ZERO,
            })
        }

        fn failing(name: &str, order: &Arc<std::sync::Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail: true,
                order: order.clone(),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl ResearchWorker for ProbeWorker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, input: Value) -> Result<Value, WorkerError> {
            self.order.lock().unwrap().push(self.name.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                // Validation class so the harness does not retry.
                return Err(WorkerError::Validation {
                    worker: self.name.clone(),
                    reason: "intentional failure".into(),
                });
            }
            Ok(json!({ "worker": self.name, "saw_context": input["context"] }))
        }
    }

    fn engine_with(workers: Vec<Arc<ProbeWorker>>) -> WorkflowEngine {
        let mut engine = WorkflowEngine::new(fast_config());
        for w in workers {
            engine.register_worker(w);
        }
        engine
    }

    #[tokio::test]
    async fn parallel_phase_settles_all_and_captures_failures() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![
            ProbeWorker::ok("t1", &order),
            ProbeWorker::failing("t2", &order),
        ]);
        let mut events = engine.subscribe();

        let plan = vec![PhasePlan::parallel(
            ResearchPhase::Discovery,
            vec![TaskSpec::new("t1", "probe"), TaskSpec::new("t2", "probe")],
        )];
        let report = engine.run("topic", plan).await.unwrap();

        let phase = report.phase(ResearchPhase::Discovery).unwrap();
        assert!(phase.results["t1"].is_success());
        match &phase.results["t2"] {
            TaskOutcome::Failed { error, worker_name } => {
                assert!(error.contains("intentional failure"));
                assert_eq!(worker_name, "t2");
            }
            other => panic!("expected captured failure, got {other:?}"),
        }

        // phase-complete still fires after a task failure.
        let mut saw_phase_complete = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ProgressEvent::PhaseCompleted { .. }) {
                saw_phase_complete = true;
            }
        }
        assert!(saw_phase_complete);
    }

    #[tokio::test]
    async fn sequential_phase_runs_in_priority_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![
            ProbeWorker::ok("low", &order),
            ProbeWorker::ok("mid", &order),
            ProbeWorker::ok("high", &order),
        ]);

        let plan = vec![PhasePlan::sequential(
            ResearchPhase::Discovery,
            vec![
                TaskSpec::new("high", "probe").priority(3),
                TaskSpec::new("low", "probe").priority(1),
                TaskSpec::new("mid", "probe").priority(2),
            ],
        )];
        engine.run("topic", plan).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["low", "mid", "high"]);
    }

    #[tokio::test]
    async fn dependency_gating_blocks_until_terminal() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![
            ProbeWorker::ok("gather", &order),
            ProbeWorker::failing("rank", &order),
            ProbeWorker::ok("summarize", &order),
        ]);

        // summarize depends on both, including the one that fails: captured
        // failure still counts as terminal and unblocks it.
        let plan = vec![PhasePlan::sequential(
            ResearchPhase::Discovery,
            vec![
                TaskSpec::new("gather", "probe").priority(1),
                TaskSpec::new("rank", "probe").priority(2),
                TaskSpec::new("summarize", "probe")
                    .priority(3)
                    .depends_on("gather")
                    .depends_on("rank"),
            ],
        )];
        let report = engine.run("topic", plan).await.unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["gather", "rank", "summarize"]
        );
        let phase = report.phase(ResearchPhase::Discovery).unwrap();
        assert!(phase.results["summarize"].is_success());
    }

    #[tokio::test]
    async fn later_phase_sees_union_of_prior_results() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![
            ProbeWorker::ok("searcher", &order),
            ProbeWorker::ok("analyst", &order),
        ]);

        let plan = vec![
            PhasePlan::parallel(
                ResearchPhase::Discovery,
                vec![TaskSpec::new("searcher", "search")],
            ),
            PhasePlan::parallel(
                ResearchPhase::Analysis,
                vec![TaskSpec::new("analyst", "analyze")],
            ),
        ];
        let report = engine.run("topic", plan).await.unwrap();

        let analysis = report.phase(ResearchPhase::Analysis).unwrap();
        let analyst_out = analysis.results["analyst"].value().unwrap();
        // The analyst's input context carried the searcher's result.
        assert!(analyst_out["saw_context"]["searcher"].is_object());
    }

    #[tokio::test]
    async fn unknown_worker_is_setup_failure_with_error_event() {
        let engine = engine_with(vec![]);
        let mut events = engine.subscribe();

        let plan = vec![PhasePlan::parallel(
            ResearchPhase::Discovery,
            vec![TaskSpec::new("ghost", "probe")],
        )];
        let err = engine.run("topic", plan).await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownWorker { .. }));

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ProgressEvent::WorkflowError { .. }) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn dependency_cycle_rejected() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![
            ProbeWorker::ok("a", &order),
            ProbeWorker::ok("b", &order),
        ]);

        let plan = vec![PhasePlan::sequential(
            ResearchPhase::Discovery,
            vec![
                TaskSpec::new("a", "probe").depends_on("b"),
                TaskSpec::new("b", "probe").depends_on("a"),
            ],
        )];
        let err = engine.run("topic", plan).await.unwrap_err();
        assert!(matches!(err, SchedulerError::DependencyCycle { .. }));
    }

    #[tokio::test]
    async fn dependency_scheduled_later_is_rejected() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![
            ProbeWorker::ok("early", &order),
            ProbeWorker::ok("late", &order),
        ]);

        let plan = vec![PhasePlan::sequential(
            ResearchPhase::Discovery,
            vec![
                TaskSpec::new("early", "probe").priority(1).depends_on("late"),
                TaskSpec::new("late", "probe").priority(2),
            ],
        )];
        let err = engine.run("topic", plan).await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnsatisfiableDependency { .. }));
    }

    #[tokio::test]
    async fn phases_out_of_order_rejected() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![ProbeWorker::ok("w", &order)]);

        let plan = vec![
            PhasePlan::parallel(ResearchPhase::Analysis, vec![TaskSpec::new("w", "probe")]),
            PhasePlan::parallel(ResearchPhase::Discovery, vec![TaskSpec::new("w", "probe")]),
        ];
        let err = engine.run("topic", plan).await.unwrap_err();
        assert!(matches!(err, SchedulerError::OutOfOrderPhase { .. }));
    }

    #[tokio::test]
    async fn events_fire_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![ProbeWorker::ok("w", &order)]);
        let mut events = engine.subscribe();

        let plan = vec![PhasePlan::parallel(
            ResearchPhase::Discovery,
            vec![TaskSpec::new("w", "probe")],
        )];
        engine.run("topic", plan).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                ProgressEvent::WorkflowStarted { .. } => "workflow_started",
                ProgressEvent::PhaseStarted { .. } => "phase_started",
                ProgressEvent::TaskCompleted { .. } => "task_completed",
                ProgressEvent::PhaseCompleted { .. } => "phase_completed",
                ProgressEvent::WorkflowCompleted => "workflow_completed",
                ProgressEvent::WorkflowError { .. } => "workflow_error",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "workflow_started",
                "phase_started",
                "task_completed",
                "phase_completed",
                "workflow_completed",
            ]
        );
    }

    #[tokio::test]
    async fn worker_stats_visible_through_engine() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let engine = engine_with(vec![ProbeWorker::ok("w", &order)]);

        let plan = vec![PhasePlan::parallel(
            ResearchPhase::Discovery,
            vec![TaskSpec::new("w", "probe")],
        )];
        engine.run("topic", plan).await.unwrap();

        let stats = engine.worker_stats("w").await.unwrap();
        assert_eq!(stats.completed, 1);
        assert!(engine.worker_stats("ghost").await.is_none());
    }

    /// Counting worker used to show settle-all vs fail-fast.
    struct SlowFailWorker {
        name: String,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ResearchWorker for SlowFailWorker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, _input: Value) -> Result<Value, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!("slow ok"))
        }
    }

    #[tokio::test]
    async fn sibling_failure_does_not_abort_slow_sibling() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let mut engine = WorkflowEngine::new(fast_config());
        engine.register_worker(ProbeWorker::failing("fast_fail", &order));
        engine.register_worker(Arc::new(SlowFailWorker {
            name: "slow_ok".into(),
            calls: calls.clone(),
        }));

        let plan = vec![PhasePlan::parallel(
            ResearchPhase::Discovery,
            vec![
                TaskSpec::new("fast_fail", "probe"),
                TaskSpec::new("slow_ok", "probe"),
            ],
        )];
        let report = engine.run("topic", plan).await.unwrap();

        let phase = report.phase(ResearchPhase::Discovery).unwrap();
        assert!(!phase.results["fast_fail"].is_success());
        assert!(phase.results["slow_ok"].is_success());
    }
}
