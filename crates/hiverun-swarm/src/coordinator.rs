//! The swarm coordinator - top-level entry point for execution requests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hiverun_protocols::{CollaboratorError, ResourceBudget, RunState};
use hiverun_run::{RunCollaborators, RunStateMachine};

use crate::config::SwarmConfig;
use crate::context::{BB_CONVERSATION_ID, BB_GOAL, SwarmContext, SwarmStatus};
use crate::error::SwarmError;
use crate::request::{
    CoordinationRequest, DelegatedRequest, ExecuteOutcome, ExecuteRequest,
};

/// Executes delegated routine requests. The algorithms behind it live
/// outside the coordination layer.
#[async_trait]
pub trait RoutineExecutor: Send + Sync {
    /// Execute the routine identified by `routine_id` with the given
    /// payload, returning its result.
    async fn execute_routine(
        &self,
        routine_id: &str,
        payload: &Value,
    ) -> Result<Value, CollaboratorError>;
}

/// Bookkeeping entry for one active swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveExecution {
    /// Swarm this entry belongs to.
    pub swarm_id: String,
    /// Id of the swarm's run.
    pub run_id: Uuid,
    /// Requesting user.
    pub user: String,
    /// Goal recorded at creation.
    pub goal: String,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
}

/// Externally visible status of one swarm.
///
/// Never a failure: unknown swarms are reported as a `failed` status
/// carrying the `SWARM_NOT_FOUND` code instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatus {
    /// Swarm the status describes.
    pub swarm_id: String,
    /// Status in the external vocabulary.
    pub status: SwarmStatus,
    /// Progress percentage in [0, 100].
    pub progress: f64,
    /// Runs currently active under the swarm.
    pub active_runs: Vec<Uuid>,
    /// Machine-readable failure code, if any.
    pub error_code: Option<String>,
}

impl ExecutionStatus {
    fn not_found(swarm_id: &str) -> Self {
        Self {
            swarm_id: swarm_id.to_string(),
            status: SwarmStatus::Failed,
            progress: 0.0,
            active_runs: Vec::new(),
            error_code: Some("SWARM_NOT_FOUND".to_string()),
        }
    }
}

/// Static capability descriptor plus cheap aggregate counters, used by
/// external routing logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Request shapes `execute` accepts.
    pub request_shapes: Vec<String>,
    /// Active-swarm ceiling.
    pub max_concurrent_swarms: usize,
    /// Credit ceiling substituted for unlimited requests.
    pub unlimited_credits_ceiling: u64,
    /// Swarms currently active.
    pub active_swarms: usize,
}

/// Top-level coordinator owning swarm contexts and their runs.
///
/// All registries are instance fields; there is no ambient global
/// state. Each run's state machine sits behind its own mutex, so state
/// transitions for one run are serialized while swarms proceed
/// concurrently.
pub struct SwarmCoordinator {
    config: SwarmConfig,
    collaborators: Arc<RunCollaborators>,
    executor: Arc<dyn RoutineExecutor>,
    contexts: DashMap<String, SwarmContext>,
    active: DashMap<String, ActiveExecution>,
    machines: DashMap<String, Arc<Mutex<RunStateMachine>>>,
}

impl SwarmCoordinator {
    /// Create a coordinator.
    pub fn new(
        config: SwarmConfig,
        collaborators: Arc<RunCollaborators>,
        executor: Arc<dyn RoutineExecutor>,
    ) -> Self {
        Self {
            config,
            collaborators,
            executor,
            contexts: DashMap::new(),
            active: DashMap::new(),
            machines: DashMap::new(),
        }
    }

    /// Single entry point: route a request by its shape.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteOutcome, SwarmError> {
        match request {
            ExecuteRequest::Coordination(req) => self.create_coordination(req).await,
            ExecuteRequest::Delegated(req) => self.execute_delegated(req).await,
        }
    }

    /// Create a swarm context and start its run.
    ///
    /// Returns as soon as the run reaches `Initializing`; driving it
    /// further is asynchronous via [`drive_swarm`](Self::drive_swarm).
    async fn create_coordination(
        &self,
        request: CoordinationRequest,
    ) -> Result<ExecuteOutcome, SwarmError> {
        let active = self.active.len();
        if active >= self.config.max_concurrent_swarms {
            return Err(SwarmError::AtCapacity {
                active,
                limit: self.config.max_concurrent_swarms,
            });
        }

        let swarm_id = format!("swarm-{}", Uuid::new_v4());
        let budget = request.resources.resolve(&self.config);
        let conversation_id = Uuid::new_v4().to_string();

        let machine = RunStateMachine::start(
            self.collaborators.clone(),
            request.routine,
            request.config,
            conversation_id.clone(),
            Some(swarm_id.clone()),
        )
        .await?;
        let run_id = machine.run().id;

        let mut context = SwarmContext::new(&swarm_id, budget);
        context
            .blackboard
            .insert(BB_GOAL.to_string(), json!(request.goal));
        context
            .blackboard
            .insert(BB_CONVERSATION_ID.to_string(), json!(conversation_id));
        context.blackboard.insert(
            "requested_credits".to_string(),
            serde_json::to_value(request.resources.max_credits).unwrap_or(Value::Null),
        );
        context.summary.active_runs.push(run_id);

        info!(%swarm_id, %run_id, user = %request.user,
            credits = budget.credits, "swarm created");

        self.contexts.insert(swarm_id.clone(), context);
        self.active.insert(
            swarm_id.clone(),
            ActiveExecution {
                swarm_id: swarm_id.clone(),
                run_id,
                user: request.user,
                goal: request.goal,
                started_at: Utc::now(),
            },
        );
        self.machines
            .insert(swarm_id.clone(), Arc::new(Mutex::new(machine)));

        Ok(ExecuteOutcome::Coordination {
            swarm_id,
            run_id,
            conversation_id,
        })
    }

    /// Forward a delegated request to the routine executor, then report
    /// consumed resources onto the parent ledger, best-effort.
    async fn execute_delegated(
        &self,
        request: DelegatedRequest,
    ) -> Result<ExecuteOutcome, SwarmError> {
        debug!(routine_id = %request.routine_id, execution_id = %request.execution_id,
            "delegated execution");
        let result = self
            .executor
            .execute_routine(&request.routine_id, &request.payload)
            .await?;

        if let Some(parent_id) = &request.parent_swarm_id {
            // Resource accounting is best-effort relative to execution
            // correctness: the result is returned even when the ledger
            // update fails. The execution id keys the charge, so a
            // retried report cannot double-spend.
            if let Err(e) = self.charge_parent(parent_id, &request.execution_id) {
                warn!(swarm_id = %parent_id, execution_id = %request.execution_id,
                    error = %e, "resource ledger update failed");
            }
        }

        Ok(ExecuteOutcome::Delegated {
            execution_id: request.execution_id,
            result,
        })
    }

    fn charge_parent(&self, swarm_id: &str, execution_id: &str) -> Result<(), SwarmError> {
        // The entry guard is the critical section; concurrent reports
        // against the same context serialize here.
        let mut context = self
            .contexts
            .get_mut(swarm_id)
            .ok_or_else(|| SwarmError::SwarmNotFound(swarm_id.to_string()))?;
        let amount = ResourceBudget::credits(self.config.delegated_execution_credits);
        context.ledger.charge(execution_id, amount)?;
        context.ledger.record_usage(execution_id, amount);
        Ok(())
    }

    /// Drive a swarm's run until it parks or terminates, then fold the
    /// result back into the swarm context.
    pub async fn drive_swarm(&self, swarm_id: &str) -> Result<SwarmStatus, SwarmError> {
        let machine = self
            .machines
            .get(swarm_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SwarmError::SwarmNotFound(swarm_id.to_string()))?;

        let (state, run_id, steps_completed, step_count) = {
            let mut machine = machine.lock().await;
            machine.drive().await?;
            let run = machine.run();
            (
                run.state,
                run.id,
                run.steps_completed,
                run.routine.step_count(),
            )
        };

        let status = SwarmStatus::from_run_state(state);
        let task_ratio = if state == RunState::Completed {
            1.0
        } else {
            steps_completed as f64 / step_count.max(1) as f64
        };
        if let Some(mut context) = self.contexts.get_mut(swarm_id) {
            context.summary.status = status;
            context
                .summary
                .metrics
                .insert("steps_completed".to_string(), steps_completed as f64);
            context
                .summary
                .metrics
                .insert("task_ratio".to_string(), task_ratio);
            if state.is_terminal() {
                context.summary.active_runs.retain(|id| *id != run_id);
                context.ledger.record_usage(
                    run_id.to_string(),
                    ResourceBudget::credits(steps_completed as u64),
                );
            }
        }
        if state.is_terminal() {
            self.active.remove(swarm_id);
        }
        Ok(status)
    }

    /// Status of a swarm in the external vocabulary. Never fails:
    /// unknown swarms report `failed` with code `SWARM_NOT_FOUND`.
    pub async fn execution_status(&self, swarm_id: &str) -> ExecutionStatus {
        let Some((summary, resource_ratio)) = self.contexts.get(swarm_id).map(|context| {
            (context.summary.clone(), context.ledger.consumed_ratio())
        }) else {
            return ExecutionStatus::not_found(swarm_id);
        };

        let mut status = summary.status;
        // Terminal runs leave the active-set; their last recorded task
        // ratio carries the progress from there on.
        let mut task_ratio = summary.metrics.get("task_ratio").copied().unwrap_or(0.0);
        if let Some(run_id) = summary.active_runs.first() {
            if let Ok(Some(run)) = self.collaborators.store.get_run(*run_id).await {
                status = SwarmStatus::from_run_state(run.state);
                let total_steps = run.routine.step_count().max(1);
                task_ratio = run.steps_completed as f64 / total_steps as f64;
            }
        }

        let progress = (resource_ratio.max(task_ratio) * 100.0).clamp(0.0, 100.0);
        ExecutionStatus {
            swarm_id: swarm_id.to_string(),
            status,
            progress,
            active_runs: summary.active_runs,
            error_code: None,
        }
    }

    /// Cancel a swarm: stop its run, drop it from the active-set and
    /// recursively cancel every child swarm recorded on its blackboard.
    /// Child failures are logged without aborting siblings.
    pub async fn cancel_execution(&self, swarm_id: &str, reason: &str) -> Result<(), SwarmError> {
        let children = self
            .contexts
            .get(swarm_id)
            .map(|context| context.child_swarm_ids())
            .ok_or_else(|| SwarmError::SwarmNotFound(swarm_id.to_string()))?;

        if let Some((_, machine)) = self.machines.remove(swarm_id) {
            let mut machine = machine.lock().await;
            if !machine.state().is_terminal() {
                machine.cancel(reason).await?;
            }
        }
        self.active.remove(swarm_id);
        if let Some(mut context) = self.contexts.get_mut(swarm_id) {
            context.summary.status = SwarmStatus::Cancelled;
            context.summary.active_runs.clear();
        }
        info!(%swarm_id, reason, children = children.len(), "swarm cancelled");

        for child_id in children {
            if let Err(e) = Box::pin(self.cancel_execution(&child_id, reason)).await {
                warn!(swarm_id = %child_id, error = %e, "child swarm cancellation failed");
            }
        }
        Ok(())
    }

    /// Record a parent/child relationship between two swarms.
    pub fn link_child_swarm(&self, parent_id: &str, child_id: &str) -> Result<(), SwarmError> {
        let mut parent = self
            .contexts
            .get_mut(parent_id)
            .ok_or_else(|| SwarmError::SwarmNotFound(parent_id.to_string()))?;
        parent.add_child_swarm(child_id);
        Ok(())
    }

    /// Static capability descriptor plus active-set counters.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            request_shapes: vec!["coordination".to_string(), "delegated".to_string()],
            max_concurrent_swarms: self.config.max_concurrent_swarms,
            unlimited_credits_ceiling: self.config.unlimited_credits_ceiling,
            active_swarms: self.active.len(),
        }
    }

    /// Snapshot of a swarm context.
    pub fn context(&self, swarm_id: &str) -> Option<SwarmContext> {
        self.contexts.get(swarm_id).map(|entry| entry.clone())
    }

    /// Snapshot of the active-set.
    pub fn active_executions(&self) -> Vec<ActiveExecution> {
        self.active.iter().map(|entry| entry.clone()).collect()
    }

    /// Aggregate metrics over the active-set.
    pub fn aggregate_metrics(&self) -> HashMap<String, f64> {
        let mut metrics = HashMap::new();
        metrics.insert("active_swarms".to_string(), self.active.len() as f64);
        metrics.insert("tracked_contexts".to_string(), self.contexts.len() as f64);
        if let Some(oldest) = self
            .active
            .iter()
            .map(|entry| entry.started_at)
            .min()
        {
            let age = (Utc::now() - oldest).num_seconds().max(0);
            metrics.insert("oldest_active_secs".to_string(), age as f64);
        }
        metrics
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
