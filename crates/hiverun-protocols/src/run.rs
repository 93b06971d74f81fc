//! Run data model and the run state graph.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::routine::Routine;

/// State of one run as it moves through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run object exists but nothing has happened yet.
    Uninitialized,
    /// Context initialized, run record persisted.
    Initializing,
    /// Navigator is resolving the next steps.
    Navigating,
    /// Branch coordinator is running declared parallel branches.
    BranchExecuting,
    /// Step executor is running the current step.
    Executing,
    /// A step failed; recovery policy decides what happens next.
    ErrorHandling,
    /// Performance report is being generated before completion.
    Finalizing,
    /// Run finished successfully. Terminal.
    Completed,
    /// Run was cancelled. Terminal.
    Cancelled,
    /// Run failed permanently. Terminal.
    Failed,
}

impl RunState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }

    /// Whether a transition from this state to `target` is legal.
    ///
    /// Any non-terminal state may move to `Cancelled` or `Failed`.
    pub fn can_transition_to(&self, target: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(target, RunState::Cancelled | RunState::Failed) {
            return true;
        }
        match self {
            RunState::Uninitialized => matches!(target, RunState::Initializing),
            RunState::Initializing => matches!(target, RunState::Navigating),
            RunState::Navigating => matches!(
                target,
                RunState::BranchExecuting | RunState::Executing | RunState::Finalizing
            ),
            RunState::BranchExecuting => {
                matches!(target, RunState::Navigating | RunState::ErrorHandling)
            }
            RunState::Executing => {
                matches!(target, RunState::Navigating | RunState::ErrorHandling)
            }
            RunState::ErrorHandling => matches!(
                target,
                RunState::Navigating | RunState::Executing | RunState::Finalizing
            ),
            RunState::Finalizing => matches!(target, RunState::Completed),
            RunState::Completed | RunState::Cancelled | RunState::Failed => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Uninitialized => "uninitialized",
            RunState::Initializing => "initializing",
            RunState::Navigating => "navigating",
            RunState::BranchExecuting => "branch_executing",
            RunState::Executing => "executing",
            RunState::ErrorHandling => "error_handling",
            RunState::Finalizing => "finalizing",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Execution configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Execution strategy name.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Model identifier used by step executors.
    #[serde(default)]
    pub model: String,
    /// Maximum number of steps before the run is stopped.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Overall run timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether declared branches may execute in parallel.
    #[serde(default)]
    pub parallel_branches: bool,
    /// Free-form tunables applied by performance insights.
    #[serde(default)]
    pub tunables: HashMap<String, Value>,
}

fn default_strategy() -> String {
    "balanced".to_string()
}

fn default_max_steps() -> u32 {
    50
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            model: String::new(),
            max_steps: default_max_steps(),
            timeout_secs: default_timeout_secs(),
            parallel_branches: false,
            tunables: HashMap::new(),
        }
    }
}

/// One in-flight execution of a routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: Uuid,
    /// Current state.
    pub state: RunState,
    /// The routine being executed.
    pub routine: Routine,
    /// Identifier of the step currently being executed, if any.
    pub current_step: Option<String>,
    /// Variable/context bindings for the run.
    pub context: Value,
    /// Accumulated step outputs, keyed by step id.
    pub outputs: HashMap<String, Value>,
    /// Ordered list of error strings accumulated by step failures.
    pub errors: Vec<String>,
    /// Execution configuration.
    pub config: ExecutionConfig,
    /// Number of steps completed so far.
    pub steps_completed: u32,
    /// Conversation identifier assigned at start.
    pub conversation_id: String,
    /// Owning swarm context, if the run belongs to one.
    pub swarm_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a new run in `Uninitialized` state.
    pub fn new(routine: Routine, config: ExecutionConfig, conversation_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: RunState::Uninitialized,
            routine,
            current_step: None,
            context: Value::Null,
            outputs: HashMap::new(),
            errors: Vec::new(),
            config,
            steps_completed: 0,
            conversation_id,
            swarm_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the run to a swarm context.
    pub fn with_swarm(mut self, swarm_id: impl Into<String>) -> Self {
        self.swarm_id = Some(swarm_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::RoutineKind;

    fn demo_routine() -> Routine {
        Routine::new("r-1", "demo", RoutineKind::Sequential, Vec::new())
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Navigating.is_terminal());
    }

    #[test]
    fn test_transition_graph() {
        assert!(RunState::Uninitialized.can_transition_to(RunState::Initializing));
        assert!(RunState::Initializing.can_transition_to(RunState::Navigating));
        assert!(RunState::Navigating.can_transition_to(RunState::BranchExecuting));
        assert!(RunState::BranchExecuting.can_transition_to(RunState::Navigating));
        assert!(RunState::Navigating.can_transition_to(RunState::Finalizing));
        assert!(RunState::Finalizing.can_transition_to(RunState::Completed));
        // Skipping states is not allowed
        assert!(!RunState::Uninitialized.can_transition_to(RunState::Executing));
        assert!(!RunState::Initializing.can_transition_to(RunState::Completed));
    }

    #[test]
    fn test_any_active_state_can_cancel_or_fail() {
        for state in [
            RunState::Uninitialized,
            RunState::Initializing,
            RunState::Navigating,
            RunState::BranchExecuting,
            RunState::Executing,
            RunState::ErrorHandling,
            RunState::Finalizing,
        ] {
            assert!(state.can_transition_to(RunState::Cancelled), "{}", state);
            assert!(state.can_transition_to(RunState::Failed), "{}", state);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [RunState::Completed, RunState::Cancelled, RunState::Failed] {
            assert!(!state.can_transition_to(RunState::Navigating));
            assert!(!state.can_transition_to(RunState::Cancelled));
        }
    }

    #[test]
    fn test_run_new_defaults() {
        let run = Run::new(demo_routine(), ExecutionConfig::default(), "conv-1".into());
        assert_eq!(run.state, RunState::Uninitialized);
        assert!(run.current_step.is_none());
        assert!(run.errors.is_empty());
        assert_eq!(run.steps_completed, 0);
        assert_eq!(run.config.max_steps, 50);
    }
}
