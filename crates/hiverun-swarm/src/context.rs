//! Swarm contexts - the shared state one coordination request creates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use hiverun_protocols::{ResourceBudget, ResourceLedger, RunState};

/// Well-known blackboard keys.
pub const BB_GOAL: &str = "goal";
pub const BB_CONVERSATION_ID: &str = "conversation_id";
pub const BB_CHILD_SWARM_IDS: &str = "child_swarm_ids";

/// Externally stable execution status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    /// Created but not yet navigating.
    Pending,
    /// Actively executing.
    Running,
    /// Parked awaiting error-handling policy.
    Paused,
    /// Finished successfully.
    Completed,
    /// Cancelled by request.
    Cancelled,
    /// Failed.
    Failed,
}

impl SwarmStatus {
    /// Map an internal run state onto the external vocabulary.
    pub fn from_run_state(state: RunState) -> Self {
        match state {
            RunState::Uninitialized | RunState::Initializing => SwarmStatus::Pending,
            RunState::Navigating
            | RunState::BranchExecuting
            | RunState::Executing
            | RunState::Finalizing => SwarmStatus::Running,
            RunState::ErrorHandling => SwarmStatus::Paused,
            RunState::Completed => SwarmStatus::Completed,
            RunState::Cancelled => SwarmStatus::Cancelled,
            RunState::Failed => SwarmStatus::Failed,
        }
    }
}

impl std::fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SwarmStatus::Pending => "pending",
            SwarmStatus::Running => "running",
            SwarmStatus::Paused => "paused",
            SwarmStatus::Completed => "completed",
            SwarmStatus::Cancelled => "cancelled",
            SwarmStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Execution-state summary of one swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Current status.
    pub status: SwarmStatus,
    /// Runs currently active under this swarm.
    pub active_runs: Vec<Uuid>,
    /// Aggregate metrics (steps completed, runs finished, ...).
    pub metrics: HashMap<String, f64>,
}

/// One shared execution context.
///
/// Owned by the coordinator; mutated both by coordination requests and
/// by delegated executions reporting resource consumption back into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmContext {
    /// Swarm identifier.
    pub id: String,
    /// Resource ledger.
    pub ledger: ResourceLedger,
    /// Key-value coordination blackboard.
    pub blackboard: HashMap<String, Value>,
    /// Execution-state summary.
    pub summary: ExecutionSummary,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl SwarmContext {
    /// Create a context with the full budget available.
    pub fn new(id: impl Into<String>, budget: ResourceBudget) -> Self {
        Self {
            id: id.into(),
            ledger: ResourceLedger::new(budget),
            blackboard: HashMap::new(),
            summary: ExecutionSummary {
                status: SwarmStatus::Pending,
                active_runs: Vec::new(),
                metrics: HashMap::new(),
            },
            created_at: Utc::now(),
        }
    }

    /// Child swarm ids recorded on the blackboard.
    pub fn child_swarm_ids(&self) -> Vec<String> {
        self.blackboard
            .get(BB_CHILD_SWARM_IDS)
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record a child swarm id on the blackboard.
    pub fn add_child_swarm(&mut self, child_id: &str) {
        let entry = self
            .blackboard
            .entry(BB_CHILD_SWARM_IDS.to_string())
            .or_insert_with(|| json!([]));
        if let Some(ids) = entry.as_array_mut() {
            if !ids.iter().any(|v| v.as_str() == Some(child_id)) {
                ids.push(json!(child_id));
            }
        }
    }
}
