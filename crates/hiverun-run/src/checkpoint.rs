//! Checkpoint policy, manager and stores.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use hiverun_protocols::{Checkpoint, CheckpointManager, CollaboratorError, Run};

/// Checkpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Whether checkpointing is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Create a checkpoint every N completed steps.
    #[serde(default = "default_interval_steps")]
    pub interval_steps: u32,

    /// Checkpoints kept per run; older ones are pruned.
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_steps() -> u32 {
    5
}

fn default_max_checkpoints() -> u32 {
    3
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_steps: default_interval_steps(),
            max_checkpoints: default_max_checkpoints(),
        }
    }
}

/// Checkpoint storage contract.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save a checkpoint.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CollaboratorError>;

    /// Latest checkpoint for a run.
    async fn get_latest(&self, run_id: Uuid) -> Result<Option<Checkpoint>, CollaboratorError>;

    /// All checkpoints for a run, oldest first.
    async fn list(&self, run_id: Uuid) -> Result<Vec<Checkpoint>, CollaboratorError>;

    /// Delete one checkpoint.
    async fn delete(&self, id: Uuid) -> Result<(), CollaboratorError>;

    /// Delete every checkpoint belonging to a run.
    async fn delete_run(&self, run_id: Uuid) -> Result<(), CollaboratorError>;
}

/// In-memory checkpoint store.
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<Uuid, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            checkpoints: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CollaboratorError> {
        let mut store = self.checkpoints.write().await;
        store.insert(checkpoint.id, checkpoint.clone());
        Ok(())
    }

    async fn get_latest(&self, run_id: Uuid) -> Result<Option<Checkpoint>, CollaboratorError> {
        let store = self.checkpoints.read().await;
        Ok(store
            .values()
            .filter(|cp| cp.run_id == run_id)
            .max_by_key(|cp| cp.steps_completed)
            .cloned())
    }

    async fn list(&self, run_id: Uuid) -> Result<Vec<Checkpoint>, CollaboratorError> {
        let store = self.checkpoints.read().await;
        let mut checkpoints: Vec<_> = store
            .values()
            .filter(|cp| cp.run_id == run_id)
            .cloned()
            .collect();
        checkpoints.sort_by_key(|cp| cp.steps_completed);
        Ok(checkpoints)
    }

    async fn delete(&self, id: Uuid) -> Result<(), CollaboratorError> {
        let mut store = self.checkpoints.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn delete_run(&self, run_id: Uuid) -> Result<(), CollaboratorError> {
        let mut store = self.checkpoints.write().await;
        store.retain(|_, cp| cp.run_id != run_id);
        Ok(())
    }
}

/// Interval-policy checkpoint manager backed by a [`CheckpointStore`].
pub struct PolicyCheckpointManager {
    config: CheckpointConfig,
    store: Arc<dyn CheckpointStore>,
}

impl PolicyCheckpointManager {
    /// Create a manager with the given policy and store.
    pub fn new(config: CheckpointConfig, store: Arc<dyn CheckpointStore>) -> Self {
        Self { config, store }
    }

    async fn prune(&self, run_id: Uuid) -> Result<(), CollaboratorError> {
        let checkpoints = self.store.list(run_id).await?;
        if checkpoints.len() > self.config.max_checkpoints as usize {
            let excess = checkpoints.len() - self.config.max_checkpoints as usize;
            for checkpoint in checkpoints.iter().take(excess) {
                self.store.delete(checkpoint.id).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointManager for PolicyCheckpointManager {
    fn should_create_checkpoint(&self, run: &Run) -> bool {
        self.config.enabled
            && run.steps_completed > 0
            && run.steps_completed % self.config.interval_steps == 0
    }

    async fn create_checkpoint(&self, run: &Run) -> Result<Checkpoint, CollaboratorError> {
        let checkpoint = Checkpoint::of_run(run);
        debug!(run_id = %run.id, checkpoint_id = %checkpoint.id,
            steps = run.steps_completed, "creating checkpoint");
        self.store.save(&checkpoint).await?;
        self.prune(run.id).await?;
        Ok(checkpoint)
    }

    async fn cleanup_checkpoints(&self, run_id: Uuid) -> Result<(), CollaboratorError> {
        debug!(%run_id, "cleaning up checkpoints");
        self.store.delete_run(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiverun_protocols::{ExecutionConfig, Routine, RoutineKind};

    fn run_with_steps(steps: u32) -> Run {
        let mut run = Run::new(
            Routine::new("r-1", "demo", RoutineKind::Sequential, Vec::new()),
            ExecutionConfig::default(),
            "conv-1".into(),
        );
        run.steps_completed = steps;
        run
    }

    #[test]
    fn test_policy_respects_interval() {
        let manager =
            PolicyCheckpointManager::new(CheckpointConfig::default(), Arc::new(MemoryCheckpointStore::new()));
        assert!(!manager.should_create_checkpoint(&run_with_steps(0)));
        assert!(!manager.should_create_checkpoint(&run_with_steps(3)));
        assert!(manager.should_create_checkpoint(&run_with_steps(5)));
        assert!(manager.should_create_checkpoint(&run_with_steps(10)));
    }

    #[test]
    fn test_policy_disabled() {
        let config = CheckpointConfig {
            enabled: false,
            ..Default::default()
        };
        let manager = PolicyCheckpointManager::new(config, Arc::new(MemoryCheckpointStore::new()));
        assert!(!manager.should_create_checkpoint(&run_with_steps(5)));
    }

    #[tokio::test]
    async fn test_create_and_cleanup() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let manager = PolicyCheckpointManager::new(CheckpointConfig::default(), store.clone());
        let run = run_with_steps(5);

        let checkpoint = manager.create_checkpoint(&run).await.unwrap();
        assert_eq!(checkpoint.run_id, run.id);
        assert_eq!(store.list(run.id).await.unwrap().len(), 1);

        manager.cleanup_checkpoints(run.id).await.unwrap();
        assert!(store.list(run.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let config = CheckpointConfig {
            interval_steps: 1,
            max_checkpoints: 2,
            ..Default::default()
        };
        let manager = PolicyCheckpointManager::new(config, store.clone());

        let mut run = run_with_steps(0);
        for steps in 1..=4 {
            run.steps_completed = steps;
            manager.create_checkpoint(&run).await.unwrap();
        }

        let kept = store.list(run.id).await.unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].steps_completed, 3);
        assert_eq!(kept[1].steps_completed, 4);
    }
}
