//! Routine definitions - the user-defined step graphs the engine executes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a routine, used to resolve a matching navigator.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    /// Straight-line routine - steps follow their declared edges.
    Sequential,
    /// Routine containing decision nodes that pick between edges.
    Decision,
    /// Routine with parallel sub-paths rejoined by the branch coordinator.
    Parallel,
    /// Custom routine kind handled by a registered navigator.
    Custom(String),
}

impl std::fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutineKind::Sequential => write!(f, "sequential"),
            RoutineKind::Decision => write!(f, "decision"),
            RoutineKind::Parallel => write!(f, "parallel"),
            RoutineKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// The kind of a single step inside a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Performs work through the step executor.
    Action,
    /// Chooses among outgoing edges.
    Decision,
    /// Runs untrusted code in the sandbox.
    Code,
    /// Ends the routine.
    Terminal,
}

/// One node of a routine's step graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineStep {
    /// Step identifier, unique within the routine.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// Step kind.
    pub kind: StepKind,
    /// Step parameters (free-form, interpreted by the executor).
    #[serde(default)]
    pub params: Value,
    /// Identifiers of steps that may follow this one.
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl RoutineStep {
    /// Create a new action step.
    pub fn action(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: StepKind::Action,
            params: Value::Null,
            next_steps: Vec::new(),
        }
    }

    /// Set the outgoing edges.
    pub fn with_next(mut self, next_steps: Vec<String>) -> Self {
        self.next_steps = next_steps;
        self
    }

    /// Set the step parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// A user-defined routine - the step graph one run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    /// Routine identifier.
    pub id: String,
    /// Human-readable routine name.
    pub name: String,
    /// Routine kind, used for navigator resolution.
    pub kind: RoutineKind,
    /// The step graph.
    pub steps: Vec<RoutineStep>,
    /// Identifier of the entry step.
    pub entry_step: String,
    /// Organizational constraints checked by the organization gate
    /// before the routine may execute.
    #[serde(default)]
    pub organization: Value,
}

impl Routine {
    /// Create a new routine from its steps. The first step is the entry.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: RoutineKind,
        steps: Vec<RoutineStep>,
    ) -> Self {
        let entry_step = steps.first().map(|s| s.id.clone()).unwrap_or_default();
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            steps,
            entry_step,
            organization: Value::Null,
        }
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&RoutineStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Number of steps in the graph.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_new_picks_entry_step() {
        let routine = Routine::new(
            "r-1",
            "demo",
            RoutineKind::Sequential,
            vec![
                RoutineStep::action("a", "first").with_next(vec!["b".into()]),
                RoutineStep::action("b", "second"),
            ],
        );
        assert_eq!(routine.entry_step, "a");
        assert_eq!(routine.step_count(), 2);
        assert!(routine.step("b").is_some());
        assert!(routine.step("missing").is_none());
    }

    #[test]
    fn test_routine_kind_display() {
        assert_eq!(RoutineKind::Sequential.to_string(), "sequential");
        assert_eq!(
            RoutineKind::Custom("audit".into()).to_string(),
            "custom:audit"
        );
    }
}
