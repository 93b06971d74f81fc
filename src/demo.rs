//! In-memory collaborator set wired by the CLI.
//!
//! These implementations are deliberately simple: the navigator walks
//! the step graph in declaration order, the executor echoes step
//! parameters (dispatching `Code` steps to the sandbox when one is
//! attached), and the context manager merges outputs into a per-run
//! JSON object.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use uuid::Uuid;

use hiverun_protocols::{
    Branch, BranchCoordinator, BranchOutcome, BroadcastEventBus, CollaboratorError,
    ContextManager, NavigationOutcome, Navigator, OrganizationGate, PathOptimizer,
    PerformanceInsight, PerformanceMonitor, PerformanceReport, Routine, RoutineKind, RoutineStep,
    Run, StepExecutor, StepKind, StepOutcome,
};
use hiverun_run::{
    CheckpointConfig, MemoryCheckpointStore, MemoryRunStore, PolicyCheckpointManager,
    RunCollaborators,
};
use hiverun_sandbox::{SandboxJob, SandboxManager};
use hiverun_swarm::RoutineExecutor;

/// Walks the routine's steps in declaration order.
pub struct DemoNavigator;

#[async_trait]
impl Navigator for DemoNavigator {
    async fn navigate(&self, run: &Run) -> Result<NavigationOutcome, CollaboratorError> {
        match run.routine.steps.get(run.steps_completed as usize) {
            Some(step) => Ok(NavigationOutcome {
                next_steps: vec![step.id.clone()],
                ..Default::default()
            }),
            None => Ok(NavigationOutcome {
                is_complete: true,
                ..Default::default()
            }),
        }
    }
}

/// Pass-through optimizer.
pub struct DemoOptimizer;

#[async_trait]
impl PathOptimizer for DemoOptimizer {
    async fn refine(
        &self,
        _run: &Run,
        outcome: NavigationOutcome,
    ) -> Result<NavigationOutcome, CollaboratorError> {
        Ok(outcome)
    }
}

/// Completes every declared branch, echoing its step list.
pub struct DemoBranchCoordinator;

#[async_trait]
impl BranchCoordinator for DemoBranchCoordinator {
    async fn coordinate_branches(
        &self,
        branches: &[Branch],
    ) -> Result<BranchOutcome, CollaboratorError> {
        let mut outcome = BranchOutcome::default();
        for branch in branches {
            outcome.completed_branches.push(branch.id.clone());
            outcome
                .results
                .insert(branch.id.clone(), json!({"steps": branch.steps}));
        }
        Ok(outcome)
    }
}

/// Echoes step parameters; dispatches `Code` steps to the sandbox.
pub struct DemoExecutor {
    sandbox: Option<Arc<SandboxManager>>,
}

impl DemoExecutor {
    pub fn new(sandbox: Option<Arc<SandboxManager>>) -> Self {
        Self { sandbox }
    }

    async fn run_code_step(&self, step: &RoutineStep, run: &Run) -> StepOutcome {
        let Some(manager) = &self.sandbox else {
            return StepOutcome {
                success: false,
                outputs: HashMap::from([("error".to_string(), json!("no sandbox attached"))]),
                next_steps: Vec::new(),
            };
        };
        let code = step
            .params
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let language = step
            .params
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or("javascript");
        let job = SandboxJob::new(code, language, run.context.clone());
        match manager.run_user_code(job).await {
            Ok(result) => StepOutcome {
                success: true,
                outputs: HashMap::from([("result".to_string(), result)]),
                next_steps: Vec::new(),
            },
            Err(e) => StepOutcome {
                success: false,
                outputs: HashMap::from([("error".to_string(), json!(e.to_string()))]),
                next_steps: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl StepExecutor for DemoExecutor {
    async fn execute_step(
        &self,
        step: &RoutineStep,
        run: &Run,
    ) -> Result<StepOutcome, CollaboratorError> {
        match step.kind {
            StepKind::Code => Ok(self.run_code_step(step, run).await),
            _ => Ok(StepOutcome {
                success: true,
                outputs: HashMap::from([
                    ("step".to_string(), json!(step.name)),
                    ("params".to_string(), step.params.clone()),
                ]),
                next_steps: Vec::new(),
            }),
        }
    }

    async fn complete_step(
        &self,
        step_id: &str,
        _output: &Value,
        run: &Run,
    ) -> Result<StepOutcome, CollaboratorError> {
        Ok(StepOutcome {
            success: true,
            next_steps: run
                .routine
                .step(step_id)
                .map(|s| s.next_steps.clone())
                .unwrap_or_default(),
            ..Default::default()
        })
    }
}

/// Per-run JSON context kept in memory; updates merge object keys.
pub struct DemoContextManager {
    contexts: RwLock<HashMap<Uuid, Value>>,
}

impl DemoContextManager {
    pub fn new() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ContextManager for DemoContextManager {
    async fn initialize_context(
        &self,
        run_id: Uuid,
        routine: &Routine,
    ) -> Result<Value, CollaboratorError> {
        let context = json!({
            "routine": routine.id,
            "steps": routine.step_count(),
        });
        self.contexts.write().await.insert(run_id, context.clone());
        Ok(context)
    }

    async fn update_context(&self, run_id: Uuid, update: Value) -> Result<Value, CollaboratorError> {
        let mut contexts = self.contexts.write().await;
        let context = contexts.entry(run_id).or_insert_with(|| json!({}));
        if let (Some(target), Some(source)) = (context.as_object_mut(), update.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(context.clone())
    }
}

/// Accepts any routine with at least one step.
pub struct DemoGate;

#[async_trait]
impl OrganizationGate for DemoGate {
    async fn validate_organization(&self, routine: &Routine) -> Result<bool, CollaboratorError> {
        Ok(!routine.steps.is_empty())
    }
}

/// Reports step/error counts; suggests parallel branches for parallel
/// routines that ran without them.
pub struct DemoMonitor;

#[async_trait]
impl PerformanceMonitor for DemoMonitor {
    async fn generate_report(&self, run: &Run) -> Result<PerformanceReport, CollaboratorError> {
        let mut report = PerformanceReport::default();
        report
            .metrics
            .insert("steps_completed".to_string(), run.steps_completed as f64);
        report
            .metrics
            .insert("errors".to_string(), run.errors.len() as f64);
        if run.routine.kind == RoutineKind::Parallel && !run.config.parallel_branches {
            report
                .insights
                .push(PerformanceInsight::EnableParallelBranches);
        }
        Ok(report)
    }
}

/// Acknowledges delegated executions without doing real work.
pub struct DemoRoutineExecutor;

#[async_trait]
impl RoutineExecutor for DemoRoutineExecutor {
    async fn execute_routine(
        &self,
        routine_id: &str,
        payload: &Value,
    ) -> Result<Value, CollaboratorError> {
        Ok(json!({
            "routine_id": routine_id,
            "accepted": true,
            "payload": payload,
        }))
    }
}

/// Build the full in-memory collaborator set.
pub fn demo_collaborators(
    sandbox: Option<Arc<SandboxManager>>,
) -> (Arc<RunCollaborators>, Arc<MemoryRunStore>, Arc<BroadcastEventBus>) {
    let store = Arc::new(MemoryRunStore::new());
    let bus = Arc::new(BroadcastEventBus::default());
    let mut navigators: HashMap<RoutineKind, Arc<dyn Navigator>> = HashMap::new();
    navigators.insert(RoutineKind::Sequential, Arc::new(DemoNavigator));
    navigators.insert(RoutineKind::Parallel, Arc::new(DemoNavigator));
    let checkpoints = PolicyCheckpointManager::new(
        CheckpointConfig::default(),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let collaborators = Arc::new(RunCollaborators {
        store: store.clone(),
        bus: bus.clone(),
        navigators,
        optimizer: Arc::new(DemoOptimizer),
        branch_coordinator: Arc::new(DemoBranchCoordinator),
        step_executor: Arc::new(DemoExecutor::new(sandbox)),
        context_manager: Arc::new(DemoContextManager::new()),
        checkpoints: Arc::new(checkpoints),
        performance: Arc::new(DemoMonitor),
        organization_gate: Arc::new(DemoGate),
    });
    (collaborators, store, bus)
}

/// The built-in routine the `run` command executes.
pub fn demo_routine(goal: &str) -> Routine {
    Routine::new(
        "demo-routine",
        "demo",
        RoutineKind::Sequential,
        vec![
            RoutineStep::action("plan", "plan the work").with_params(json!({"goal": goal})),
            RoutineStep::action("gather", "gather inputs").with_next(vec!["report".into()]),
            RoutineStep::action("report", "produce the report"),
        ],
    )
}
