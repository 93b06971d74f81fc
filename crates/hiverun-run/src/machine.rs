//! The run state machine.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hiverun_protocols::{
    Branch, BranchCoordinator, CheckpointManager, ContextManager, EventBus, ExecutionConfig,
    Navigator, OrganizationGate, PathOptimizer, PerformanceInsight, PerformanceMonitor, Routine,
    RoutineKind, Run, RunEvent, RunState, RunStore, RunUpdate, StepExecutor,
};

use crate::error::RunError;

/// The collaborators one state machine drives.
///
/// Every call through these is a suspension point; the machine awaits
/// each before advancing.
pub struct RunCollaborators {
    /// Run persistence.
    pub store: Arc<dyn RunStore>,
    /// Run lifecycle event distribution.
    pub bus: Arc<dyn EventBus>,
    /// Navigators keyed by the routine kind they handle.
    pub navigators: HashMap<RoutineKind, Arc<dyn Navigator>>,
    /// Path optimizer consulted after each navigation.
    pub optimizer: Arc<dyn PathOptimizer>,
    /// Branch coordination.
    pub branch_coordinator: Arc<dyn BranchCoordinator>,
    /// Step execution.
    pub step_executor: Arc<dyn StepExecutor>,
    /// Context initialization and updates.
    pub context_manager: Arc<dyn ContextManager>,
    /// Checkpoint policy and lifecycle.
    pub checkpoints: Arc<dyn CheckpointManager>,
    /// Performance report generation.
    pub performance: Arc<dyn PerformanceMonitor>,
    /// Pre-flight organizational validation.
    pub organization_gate: Arc<dyn OrganizationGate>,
}

/// Drives one run through its state graph.
///
/// One machine owns one run and is driven by one task, so state
/// transitions for a run are naturally serialized. Many machines run
/// concurrently and independently.
pub struct RunStateMachine {
    run: Run,
    pending_branches: Vec<Branch>,
    collaborators: Arc<RunCollaborators>,
}

impl std::fmt::Debug for RunStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStateMachine")
            .field("run", &self.run)
            .field("pending_branches", &self.pending_branches)
            .finish_non_exhaustive()
    }
}

impl RunStateMachine {
    /// Validate, create and persist a new run, leaving it in
    /// `Initializing`. The only entry point that creates a run.
    ///
    /// The organization gate runs first: on rejection this fails with
    /// [`RunError::OrganizationValidation`] and neither a context nor a
    /// run record is created.
    pub async fn start(
        collaborators: Arc<RunCollaborators>,
        routine: Routine,
        config: ExecutionConfig,
        conversation_id: String,
        swarm_id: Option<String>,
    ) -> Result<Self, RunError> {
        let valid = collaborators
            .organization_gate
            .validate_organization(&routine)
            .await?;
        if !valid {
            warn!(routine_id = %routine.id, "organization gate rejected routine");
            return Err(RunError::OrganizationValidation);
        }

        let mut run = Run::new(routine, config, conversation_id);
        run.swarm_id = swarm_id;
        run.context = collaborators
            .context_manager
            .initialize_context(run.id, &run.routine)
            .await?;
        collaborators.store.create_run(&run).await?;
        info!(run_id = %run.id, routine_id = %run.routine.id, "run created");

        let mut machine = Self {
            run,
            pending_branches: Vec::new(),
            collaborators,
        };
        machine.enter_state(RunState::Initializing).await?;
        Ok(machine)
    }

    /// Attach a machine to an already persisted run.
    pub async fn resume(
        collaborators: Arc<RunCollaborators>,
        run_id: Uuid,
    ) -> Result<Self, RunError> {
        let run = collaborators
            .store
            .get_run(run_id)
            .await?
            .ok_or(RunError::RunNotFound(run_id))?;
        Ok(Self {
            run,
            pending_branches: Vec::new(),
            collaborators,
        })
    }

    /// The run this machine drives.
    pub fn run(&self) -> &Run {
        &self.run
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.run.state
    }

    /// Drive the run from `Initializing` until it parks in a state
    /// needing outside input (`ErrorHandling`) or terminates.
    pub async fn drive(&mut self) -> Result<&Run, RunError> {
        self.transition_to(RunState::Navigating).await?;
        Ok(&self.run)
    }

    /// Transition to a target state and run the per-state behavior,
    /// following any further transitions the behavior demands.
    pub async fn transition_to(&mut self, target: RunState) -> Result<(), RunError> {
        let mut next = Some(target);
        while let Some(state) = next.take() {
            self.enter_state(state).await?;
            next = self.state_actions(state).await?;
        }
        Ok(())
    }

    /// Handle a completed step: executor result handling, context
    /// update, step-pointer advance, and opportunistic checkpointing.
    pub async fn handle_step_completion(
        &mut self,
        step_id: &str,
        output: Value,
    ) -> Result<(), RunError> {
        let outcome = self
            .collaborators
            .step_executor
            .complete_step(step_id, &output, &self.run)
            .await?;
        self.run.context = self
            .collaborators
            .context_manager
            .update_context(self.run.id, output.clone())
            .await?;

        self.run.outputs.insert(step_id.to_string(), output);
        for (key, value) in outcome.outputs {
            self.run.outputs.insert(key, value);
        }
        self.run.steps_completed += 1;
        self.run.current_step = outcome.next_steps.first().cloned();
        debug!(run_id = %self.run.id, step_id, next = ?self.run.current_step,
            "step completed");

        self.persist(
            RunUpdate::default()
                .with_context(self.run.context.clone())
                .with_outputs(self.run.outputs.clone())
                .with_current_step(self.run.current_step.clone())
                .with_steps_completed(self.run.steps_completed),
        )
        .await?;

        if self.collaborators.checkpoints.should_create_checkpoint(&self.run) {
            let checkpoint = self
                .collaborators
                .checkpoints
                .create_checkpoint(&self.run)
                .await?;
            debug!(run_id = %self.run.id, checkpoint_id = %checkpoint.id, "checkpoint created");
        }
        Ok(())
    }

    /// Record a step failure and move into `ErrorHandling`.
    ///
    /// Classification of the failure is the caller's business; exactly
    /// one error string is appended here.
    pub async fn handle_step_failure(
        &mut self,
        step_id: &str,
        reason: &str,
    ) -> Result<(), RunError> {
        warn!(run_id = %self.run.id, step_id, reason, "step failed");
        self.run
            .errors
            .push(format!("Step {} failed: {}", step_id, reason));
        self.persist(RunUpdate::default().with_errors(self.run.errors.clone()))
            .await?;
        if self.run.state != RunState::ErrorHandling {
            self.enter_state(RunState::ErrorHandling).await?;
        }
        Ok(())
    }

    /// Cancel the run: state `Cancelled`, checkpoint cleanup, and a
    /// cancellation event. In-flight collaborator work is interrupted
    /// cooperatively by its owner; the run ends `Cancelled` either way.
    pub async fn cancel(&mut self, reason: &str) -> Result<(), RunError> {
        info!(run_id = %self.run.id, reason, "cancelling run");
        self.enter_state(RunState::Cancelled).await?;
        self.collaborators
            .checkpoints
            .cleanup_checkpoints(self.run.id)
            .await?;
        self.collaborators
            .bus
            .publish(RunEvent::Cancelled {
                run_id: self.run.id,
                reason: reason.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Apply an optimizer-suggested configuration change onto the run's
    /// config - a feedback loop from observed performance into future
    /// behavior, without replaying history.
    pub async fn handle_performance_insight(
        &mut self,
        insight: PerformanceInsight,
    ) -> Result<(), RunError> {
        debug!(run_id = %self.run.id, insight = ?insight, "applying performance insight");
        match insight {
            PerformanceInsight::EnableParallelBranches => {
                self.run.config.parallel_branches = true;
            }
            PerformanceInsight::LimitMaxSteps { max_steps } => {
                self.run.config.max_steps = max_steps;
            }
            PerformanceInsight::SetTunable { key, value } => {
                self.run.config.tunables.insert(key, value);
            }
        }
        self.persist(RunUpdate::default().with_config(self.run.config.clone()))
            .await
    }

    /// Switch states, persist, and publish the transition event.
    async fn enter_state(&mut self, to: RunState) -> Result<(), RunError> {
        let from = self.run.state;
        if !from.can_transition_to(to) {
            return Err(RunError::InvalidTransition { from, to });
        }
        self.run.state = to;
        self.persist(RunUpdate::state(to)).await?;
        info!(run_id = %self.run.id, %from, %to, "run state transition");
        self.collaborators
            .bus
            .publish(RunEvent::StateTransition {
                run_id: self.run.id,
                from,
                to,
            })
            .await?;
        Ok(())
    }

    /// Per-state behavior; returns the next state to enter, if any.
    async fn state_actions(&mut self, state: RunState) -> Result<Option<RunState>, RunError> {
        match state {
            RunState::Navigating => self.navigate().await,
            RunState::BranchExecuting => self.execute_branches().await,
            RunState::Executing => self.execute_current_step().await,
            RunState::Finalizing => self.finalize().await,
            RunState::Completed => {
                self.collaborators
                    .checkpoints
                    .cleanup_checkpoints(self.run.id)
                    .await?;
                self.collaborators
                    .bus
                    .publish(RunEvent::Completed {
                        run_id: self.run.id,
                        outputs: self.run.outputs.clone(),
                    })
                    .await?;
                info!(run_id = %self.run.id, "run completed");
                Ok(None)
            }
            // ErrorHandling parks until an outside policy resumes the run;
            // the remaining states have no automatic behavior.
            _ => Ok(None),
        }
    }

    async fn navigate(&mut self) -> Result<Option<RunState>, RunError> {
        let navigator = self
            .collaborators
            .navigators
            .get(&self.run.routine.kind)
            .cloned()
            .ok_or_else(|| RunError::NavigatorNotFound(self.run.routine.kind.clone()))?;
        let outcome = navigator.navigate(&self.run).await?;
        let outcome = self.collaborators.optimizer.refine(&self.run, outcome).await?;

        if outcome.is_complete {
            return Ok(Some(RunState::Finalizing));
        }
        if !outcome.branches.is_empty() {
            self.pending_branches = outcome.branches;
            return Ok(Some(RunState::BranchExecuting));
        }
        match outcome.next_steps.first() {
            Some(step_id) => {
                self.run.current_step = Some(step_id.clone());
                self.persist(
                    RunUpdate::default().with_current_step(self.run.current_step.clone()),
                )
                .await?;
                Ok(Some(RunState::Executing))
            }
            // Nothing left to navigate to
            None => Ok(Some(RunState::Finalizing)),
        }
    }

    async fn execute_branches(&mut self) -> Result<Option<RunState>, RunError> {
        let branches = std::mem::take(&mut self.pending_branches);
        debug!(run_id = %self.run.id, branches = branches.len(), "coordinating branches");
        let outcome = self
            .collaborators
            .branch_coordinator
            .coordinate_branches(&branches)
            .await?;
        for (branch_id, value) in outcome.results {
            self.run.outputs.insert(branch_id, value);
        }
        self.run.steps_completed += outcome.completed_branches.len() as u32;
        self.persist(
            RunUpdate::default()
                .with_outputs(self.run.outputs.clone())
                .with_steps_completed(self.run.steps_completed),
        )
        .await?;
        Ok(Some(RunState::Navigating))
    }

    async fn execute_current_step(&mut self) -> Result<Option<RunState>, RunError> {
        let Some(step_id) = self.run.current_step.clone() else {
            return Ok(Some(RunState::Navigating));
        };
        if self.run.steps_completed >= self.run.config.max_steps {
            self.handle_step_failure(&step_id, "maximum step count exceeded")
                .await?;
            return Ok(None);
        }
        let Some(step) = self.run.routine.step(&step_id).cloned() else {
            self.handle_step_failure(&step_id, "step not defined in routine")
                .await?;
            return Ok(None);
        };

        match self
            .collaborators
            .step_executor
            .execute_step(&step, &self.run)
            .await
        {
            Ok(outcome) if outcome.success => {
                let output = Value::Object(outcome.outputs.into_iter().collect());
                self.handle_step_completion(&step_id, output).await?;
                Ok(Some(RunState::Navigating))
            }
            Ok(outcome) => {
                let reason = outcome
                    .outputs
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("step reported failure")
                    .to_string();
                self.handle_step_failure(&step_id, &reason).await?;
                Ok(None)
            }
            Err(e) => {
                self.handle_step_failure(&step_id, &e.to_string()).await?;
                Ok(None)
            }
        }
    }

    async fn finalize(&mut self) -> Result<Option<RunState>, RunError> {
        let report = self.collaborators.performance.generate_report(&self.run).await?;
        debug!(run_id = %self.run.id, metrics = report.metrics.len(),
            insights = report.insights.len(), "performance report generated");
        for insight in report.insights {
            self.handle_performance_insight(insight).await?;
        }
        Ok(Some(RunState::Completed))
    }

    async fn persist(&self, update: RunUpdate) -> Result<(), RunError> {
        self.collaborators
            .store
            .update_run(self.run.id, update)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
