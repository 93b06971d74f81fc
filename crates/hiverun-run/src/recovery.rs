//! Recovery from the latest checkpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::error::RunError;

/// State restored from a checkpoint.
#[derive(Debug, Clone)]
pub struct RecoveredState {
    /// Checkpoint the state came from.
    pub checkpoint_id: Uuid,
    /// Step pointer at checkpoint time.
    pub current_step: Option<String>,
    /// Context snapshot at checkpoint time.
    pub context: Value,
    /// Completed-step count at checkpoint time.
    pub steps_completed: u32,
    /// When the checkpoint was taken.
    pub created_at: DateTime<Utc>,
}

/// Restores crashed runs from their most recent checkpoint.
pub struct RecoveryManager {
    store: Arc<dyn CheckpointStore>,
}

impl RecoveryManager {
    /// Create a recovery manager over a checkpoint store.
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Recover the latest checkpointed state for a run, if any exists.
    pub async fn recover(&self, run_id: Uuid) -> Result<Option<RecoveredState>, RunError> {
        let Some(checkpoint) = self.store.get_latest(run_id).await? else {
            return Ok(None);
        };
        info!(%run_id, checkpoint_id = %checkpoint.id,
            steps = checkpoint.steps_completed, "recovering run from checkpoint");
        Ok(Some(RecoveredState {
            checkpoint_id: checkpoint.id,
            current_step: checkpoint.current_step,
            context: checkpoint.context,
            steps_completed: checkpoint.steps_completed,
            created_at: checkpoint.created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use hiverun_protocols::Checkpoint;
    use serde_json::json;

    #[tokio::test]
    async fn test_recover_none_without_checkpoints() {
        let manager = RecoveryManager::new(Arc::new(MemoryCheckpointStore::new()));
        assert!(manager.recover(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recover_latest_checkpoint() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let run_id = Uuid::new_v4();
        for steps in [2u32, 4] {
            let checkpoint = Checkpoint {
                id: Uuid::new_v4(),
                run_id,
                current_step: Some(format!("step-{}", steps)),
                context: json!({"steps": steps}),
                steps_completed: steps,
                created_at: Utc::now(),
            };
            store.save(&checkpoint).await.unwrap();
        }

        let manager = RecoveryManager::new(store);
        let recovered = manager.recover(run_id).await.unwrap().unwrap();
        assert_eq!(recovered.steps_completed, 4);
        assert_eq!(recovered.current_step.as_deref(), Some("step-4"));
    }
}
