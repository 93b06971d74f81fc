//! In-memory run store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use hiverun_protocols::{Run, RunStore, RunUpdate, StoreError};

/// In-memory run store for tests and single-process deployments.
///
/// Partial updates are applied under a write lock, so concurrent
/// updates to disjoint fields never clobber each other.
pub struct MemoryRunStore {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl MemoryRunStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored runs.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Whether the store holds no runs.
    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<Run>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&id).cloned())
    }

    async fn update_run(&self, id: Uuid, update: RunUpdate) -> Result<Run, StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&id).ok_or(StoreError::RunNotFound(id))?;
        update.apply(run);
        Ok(run.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiverun_protocols::{ExecutionConfig, Routine, RoutineKind, RunState};

    fn demo_run() -> Run {
        Run::new(
            Routine::new("r-1", "demo", RoutineKind::Sequential, Vec::new()),
            ExecutionConfig::default(),
            "conv-1".into(),
        )
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let store = MemoryRunStore::new();
        let run = demo_run();
        store.create_run(&run).await.unwrap();

        let fetched = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, RunState::Uninitialized);

        let updated = store
            .update_run(run.id, RunUpdate::state(RunState::Initializing))
            .await
            .unwrap();
        assert_eq!(updated.state, RunState::Initializing);
    }

    #[tokio::test]
    async fn test_update_missing_run() {
        let store = MemoryRunStore::new();
        let err = store
            .update_run(Uuid::new_v4(), RunUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn test_partial_update_preserves_other_fields() {
        let store = MemoryRunStore::new();
        let mut run = demo_run();
        run.errors.push("kept".into());
        store.create_run(&run).await.unwrap();

        store
            .update_run(run.id, RunUpdate::default().with_steps_completed(7))
            .await
            .unwrap();

        let fetched = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(fetched.steps_completed, 7);
        assert_eq!(fetched.errors, vec!["kept".to_string()]);
    }
}
