//! Wire protocol between the manager and its worker process.
//!
//! Messages travel as line-delimited JSON over the worker's stdio.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Messages sent from the worker to the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Worker finished starting up and can accept a job.
    Ready,
    /// Periodic liveness signal.
    Heartbeat,
    /// Diagnostic output, forwarded to logging only.
    Log {
        /// Log line.
        log: String,
    },
    /// Job result payload, encoded with the structured codec.
    Output {
        /// Encoded result value.
        output: Value,
    },
    /// Job failed inside the worker.
    Error {
        /// Failure message.
        error: String,
    },
}

/// Messages sent from the manager to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ManagerMessage {
    /// Run a job.
    Job {
        /// Job identifier.
        id: Uuid,
        /// Source code to run.
        code: String,
        /// Code language.
        language: String,
        /// Job input value.
        input: Value,
    },
    /// Shut down gracefully.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_message_discriminators() {
        let ready: WorkerMessage = serde_json::from_value(json!({"type": "ready"})).unwrap();
        assert_eq!(ready, WorkerMessage::Ready);

        let heartbeat: WorkerMessage =
            serde_json::from_value(json!({"type": "heartbeat"})).unwrap();
        assert_eq!(heartbeat, WorkerMessage::Heartbeat);

        let log: WorkerMessage =
            serde_json::from_value(json!({"type": "log", "log": "hi"})).unwrap();
        assert_eq!(log, WorkerMessage::Log { log: "hi".into() });

        let output: WorkerMessage =
            serde_json::from_value(json!({"type": "output", "output": {"x": 1}})).unwrap();
        assert_eq!(
            output,
            WorkerMessage::Output {
                output: json!({"x": 1})
            }
        );

        let error: WorkerMessage =
            serde_json::from_value(json!({"type": "error", "error": "boom"})).unwrap();
        assert_eq!(error, WorkerMessage::Error { error: "boom".into() });
    }

    #[test]
    fn test_manager_message_serializes_tagged() {
        let msg = ManagerMessage::Job {
            id: Uuid::nil(),
            code: "1 + 1".into(),
            language: "javascript".into(),
            input: Value::Null,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "job");
        assert_eq!(json["language"], "javascript");

        let json = serde_json::to_value(ManagerMessage::Shutdown).unwrap();
        assert_eq!(json["type"], "shutdown");
    }
}
