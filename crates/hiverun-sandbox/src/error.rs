//! Sandbox errors.

use thiserror::Error;

/// Sandbox error types.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Job language not accepted by this manager.
    #[error("Unsupported code language: {0}")]
    UnsupportedLanguage(String),

    /// Worker missed its heartbeat deadline or exited unexpectedly.
    #[error("Worker crashed or became unresponsive")]
    WorkerCrashed,

    /// Worker did not report ready before the startup deadline.
    #[error("Worker failed to become ready within {0}ms")]
    ReadyTimeout(u64),

    /// Worker failed while starting up.
    #[error("Worker startup failed: {0}")]
    StartFailed(String),

    /// Job exceeded its deadline.
    #[error("Job timed out after {0}ms")]
    JobTimeout(u64),

    /// Worker reported an execution error for the job.
    #[error("Code execution failed: {0}")]
    Execution(String),

    /// Manager gave up after repeated worker crashes.
    #[error("Worker restart limit reached")]
    RestartLimit,

    /// Manager is shutting down; the job was not executed.
    #[error("Sandbox manager is shutting down")]
    ShuttingDown,

    /// Wire protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization failure on the wire.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Process I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
