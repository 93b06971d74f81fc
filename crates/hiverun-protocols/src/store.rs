//! Run persistence contract with partial updates.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::run::{ExecutionConfig, Run, RunState};

/// A partial update to a run record.
///
/// Only the fields that are `Some` are written, so concurrent updates to
/// disjoint fields do not clobber each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunUpdate {
    /// New state.
    pub state: Option<RunState>,
    /// New step pointer (outer `Option` = field presence,
    /// inner = pointer value).
    pub current_step: Option<Option<String>>,
    /// New context bindings.
    pub context: Option<Value>,
    /// New outputs map.
    pub outputs: Option<HashMap<String, Value>>,
    /// New error list.
    pub errors: Option<Vec<String>>,
    /// New execution config.
    pub config: Option<ExecutionConfig>,
    /// New completed-step count.
    pub steps_completed: Option<u32>,
}

impl RunUpdate {
    /// Update carrying only a state change.
    pub fn state(state: RunState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    /// Set the step pointer.
    pub fn with_current_step(mut self, step: Option<String>) -> Self {
        self.current_step = Some(step);
        self
    }

    /// Set the context bindings.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the outputs map.
    pub fn with_outputs(mut self, outputs: HashMap<String, Value>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Set the error list.
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Set the execution config.
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the completed-step count.
    pub fn with_steps_completed(mut self, steps: u32) -> Self {
        self.steps_completed = Some(steps);
        self
    }

    /// Apply this update to a run record in place.
    pub fn apply(&self, run: &mut Run) {
        if let Some(state) = self.state {
            run.state = state;
        }
        if let Some(step) = &self.current_step {
            run.current_step = step.clone();
        }
        if let Some(context) = &self.context {
            run.context = context.clone();
        }
        if let Some(outputs) = &self.outputs {
            run.outputs = outputs.clone();
        }
        if let Some(errors) = &self.errors {
            run.errors = errors.clone();
        }
        if let Some(config) = &self.config {
            run.config = config.clone();
        }
        if let Some(steps) = self.steps_completed {
            run.steps_completed = steps;
        }
        run.updated_at = Utc::now();
    }
}

/// Run persistence contract.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run record.
    async fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Fetch a run by id.
    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError>;

    /// Apply a partial update to a run, returning the updated record.
    async fn update_run(&self, id: Uuid, update: RunUpdate) -> Result<Run, StoreError>;
}
