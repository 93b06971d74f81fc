//! Collaborator contracts consumed by the run state machine.
//!
//! The algorithms behind these traits (navigation, branch coordination,
//! step execution, path optimization) live outside the engine; only their
//! contracts are defined here.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CollaboratorError;
use crate::routine::{Routine, RoutineStep};
use crate::run::Run;

/// A parallel sub-path declared by the navigator and coordinated by the
/// branch coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    /// Branch identifier.
    pub id: String,
    /// Step identifiers making up the branch.
    pub steps: Vec<String>,
    /// Branch parameters.
    #[serde(default)]
    pub params: Value,
}

/// Result of one navigation call.
#[derive(Debug, Clone, Default)]
pub struct NavigationOutcome {
    /// Steps to execute next, in order.
    pub next_steps: Vec<String>,
    /// Parallel branches to hand to the branch coordinator.
    pub branches: Vec<Branch>,
    /// Whether the routine has reached its end.
    pub is_complete: bool,
}

/// Result of coordinating a set of branches.
#[derive(Debug, Clone, Default)]
pub struct BranchOutcome {
    /// Identifiers of branches that completed.
    pub completed_branches: Vec<String>,
    /// Per-branch results.
    pub results: HashMap<String, Value>,
}

/// Result of executing (or completing) one step.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Whether the step succeeded.
    pub success: bool,
    /// Step outputs.
    pub outputs: HashMap<String, Value>,
    /// Steps declared to follow this one.
    pub next_steps: Vec<String>,
}

/// Resolves the next steps of a routine.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Determine what comes next for the given run.
    async fn navigate(&self, run: &Run) -> Result<NavigationOutcome, CollaboratorError>;
}

/// Refines a navigation outcome (step ordering, pruning) and produces
/// performance insights fed back into run configuration.
#[async_trait]
pub trait PathOptimizer: Send + Sync {
    /// Refine a freshly produced navigation outcome.
    async fn refine(
        &self,
        run: &Run,
        outcome: NavigationOutcome,
    ) -> Result<NavigationOutcome, CollaboratorError>;
}

/// Runs and rejoins parallel branches.
#[async_trait]
pub trait BranchCoordinator: Send + Sync {
    /// Coordinate the declared branches to completion.
    async fn coordinate_branches(
        &self,
        branches: &[Branch],
    ) -> Result<BranchOutcome, CollaboratorError>;
}

/// Executes single routine steps.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute a step in the context of a run.
    async fn execute_step(
        &self,
        step: &RoutineStep,
        run: &Run,
    ) -> Result<StepOutcome, CollaboratorError>;

    /// Handle the result of a step whose output was produced elsewhere
    /// (for example by a sandbox worker), returning the follow-up steps.
    async fn complete_step(
        &self,
        step_id: &str,
        output: &Value,
        run: &Run,
    ) -> Result<StepOutcome, CollaboratorError>;
}

/// Initializes and updates the variable bindings of a run.
#[async_trait]
pub trait ContextManager: Send + Sync {
    /// Build the initial context for a routine.
    async fn initialize_context(
        &self,
        run_id: Uuid,
        routine: &Routine,
    ) -> Result<Value, CollaboratorError>;

    /// Merge an update into the run's context, returning the new context.
    async fn update_context(&self, run_id: Uuid, update: Value)
        -> Result<Value, CollaboratorError>;
}

/// Pre-flight validation that a routine may legally execute under
/// organizational constraints.
#[async_trait]
pub trait OrganizationGate: Send + Sync {
    /// Returns false when the routine violates its organization model.
    async fn validate_organization(&self, routine: &Routine) -> Result<bool, CollaboratorError>;
}

/// A durable snapshot of a run's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint identifier.
    pub id: Uuid,
    /// Run this checkpoint belongs to.
    pub run_id: Uuid,
    /// Step pointer at checkpoint time.
    pub current_step: Option<String>,
    /// Serialized context snapshot.
    pub context: Value,
    /// Number of steps completed at checkpoint time.
    pub steps_completed: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshot a run into a new checkpoint.
    pub fn of_run(run: &Run) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run.id,
            current_step: run.current_step.clone(),
            context: run.context.clone(),
            steps_completed: run.steps_completed,
            created_at: Utc::now(),
        }
    }
}

/// Checkpoint policy and lifecycle.
#[async_trait]
pub trait CheckpointManager: Send + Sync {
    /// Whether a checkpoint should be created for the run right now.
    fn should_create_checkpoint(&self, run: &Run) -> bool;

    /// Create and persist a checkpoint for the run.
    async fn create_checkpoint(&self, run: &Run) -> Result<Checkpoint, CollaboratorError>;

    /// Remove all checkpoints belonging to a run.
    async fn cleanup_checkpoints(&self, run_id: Uuid) -> Result<(), CollaboratorError>;
}

/// An optimizer-suggested configuration change applied onto a run's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformanceInsight {
    /// Enable parallel branch execution.
    EnableParallelBranches,
    /// Lower or raise the step ceiling.
    LimitMaxSteps {
        /// New step ceiling.
        max_steps: u32,
    },
    /// Set an arbitrary tunable.
    SetTunable {
        /// Tunable key.
        key: String,
        /// Tunable value.
        value: Value,
    },
}

/// Performance report generated while finalizing a run.
#[derive(Debug, Clone, Default)]
pub struct PerformanceReport {
    /// Aggregate metrics.
    pub metrics: HashMap<String, f64>,
    /// Insights to feed back into configuration.
    pub insights: Vec<PerformanceInsight>,
}

/// Generates performance reports for finished runs.
#[async_trait]
pub trait PerformanceMonitor: Send + Sync {
    /// Produce the performance report for a run.
    async fn generate_report(&self, run: &Run) -> Result<PerformanceReport, CollaboratorError>;
}
