//! Run lifecycle events and the event bus contract.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::EventError;
use crate::run::RunState;

/// A run lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum RunEvent {
    /// A run moved from one state to another.
    #[serde(rename = "run.state_transition")]
    StateTransition {
        /// Run identifier.
        run_id: Uuid,
        /// Previous state.
        from: RunState,
        /// New state.
        to: RunState,
    },
    /// A run completed, carrying its final outputs.
    #[serde(rename = "run.completed")]
    Completed {
        /// Run identifier.
        run_id: Uuid,
        /// Final outputs keyed by step id.
        outputs: HashMap<String, Value>,
    },
    /// A run was cancelled.
    #[serde(rename = "run.cancelled")]
    Cancelled {
        /// Run identifier.
        run_id: Uuid,
        /// Cancellation reason.
        reason: String,
    },
}

impl RunEvent {
    /// The topic this event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            RunEvent::StateTransition { .. } => "run.state_transition",
            RunEvent::Completed { .. } => "run.completed",
            RunEvent::Cancelled { .. } => "run.cancelled",
        }
    }

    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::StateTransition { run_id, .. }
            | RunEvent::Completed { run_id, .. }
            | RunEvent::Cancelled { run_id, .. } => *run_id,
        }
    }
}

/// Event distribution contract.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers.
    async fn publish(&self, event: RunEvent) -> Result<(), EventError>;
}

/// In-process event bus backed by a tokio broadcast channel.
///
/// Suitable for tests and single-process deployments; distributed
/// deployments plug in their own [`EventBus`] implementation.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl BroadcastEventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: RunEvent) -> Result<(), EventError> {
        debug!(topic = event.topic(), run_id = %event.run_id(), "publishing event");
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_topics() {
        let run_id = Uuid::new_v4();
        let transition = RunEvent::StateTransition {
            run_id,
            from: RunState::Uninitialized,
            to: RunState::Initializing,
        };
        assert_eq!(transition.topic(), "run.state_transition");
        assert_eq!(transition.run_id(), run_id);

        let completed = RunEvent::Completed {
            run_id,
            outputs: HashMap::new(),
        };
        assert_eq!(completed.topic(), "run.completed");

        let cancelled = RunEvent::Cancelled {
            run_id,
            reason: "user request".into(),
        };
        assert_eq!(cancelled.topic(), "run.cancelled");
    }

    #[test]
    fn test_event_serializes_with_topic_tag() {
        let event = RunEvent::Cancelled {
            run_id: Uuid::new_v4(),
            reason: "shutdown".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "run.cancelled");
        assert_eq!(json["reason"], "shutdown");
    }

    #[tokio::test]
    async fn test_broadcast_bus_delivers_to_subscriber() {
        let bus = BroadcastEventBus::default();
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        bus.publish(RunEvent::Cancelled {
            run_id,
            reason: "test".into(),
        })
        .await
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id(), run_id);
        assert_eq!(event.topic(), "run.cancelled");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::default();
        bus.publish(RunEvent::Cancelled {
            run_id: Uuid::new_v4(),
            reason: "nobody listening".into(),
        })
        .await
        .unwrap();
    }
}
