//! Worker backends - the primitive operations the manager drives.
//!
//! Process-based and in-process backends share the same small interface
//! instead of inheriting from a common manager variant, so the manager's
//! state machine stays backend-agnostic.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SandboxError;
use crate::protocol::{ManagerMessage, WorkerMessage};

/// Manager/worker lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// No worker exists.
    Inactive,
    /// Worker process spawned, waiting for its ready message.
    Starting,
    /// Worker alive with no job in flight.
    Idle,
    /// Worker executing a job.
    Processing,
    /// Worker being torn down.
    Terminating,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerStatus::Inactive => "inactive",
            WorkerStatus::Starting => "starting",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Processing => "processing",
            WorkerStatus::Terminating => "terminating",
        };
        write!(f, "{}", name)
    }
}

/// Limits injected into the worker at spawn time.
#[derive(Debug, Clone, Copy)]
pub struct WorkerLimits {
    /// Memory ceiling in megabytes.
    pub memory_mb: u64,
    /// Job deadline the worker should enforce on its side too.
    pub job_timeout: Duration,
}

/// One live worker owned by the manager.
#[async_trait]
pub trait WorkerHandle: Send {
    /// Worker identifier.
    fn id(&self) -> &str;

    /// Whether the underlying worker still looks alive. Heartbeats are
    /// the authoritative liveness signal; this only detects a worker
    /// already known to be gone.
    fn is_active(&self) -> bool;

    /// Send a message to the worker.
    async fn send_message(&mut self, message: &ManagerMessage) -> Result<(), SandboxError>;

    /// Tear the worker down: graceful signal, grace period, force kill.
    /// Returns once the worker has actually exited.
    async fn terminate(&mut self, grace: Duration) -> Result<(), SandboxError>;
}

/// Creates workers for the manager.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Spawn a worker, returning its handle and its message stream.
    async fn create_worker(
        &self,
        limits: &WorkerLimits,
    ) -> Result<(Box<dyn WorkerHandle>, mpsc::Receiver<WorkerMessage>), SandboxError>;
}

/// Configuration for the OS-process backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBackendConfig {
    /// Program to spawn (typically a runtime such as `node`).
    pub program: String,
    /// Arguments, typically the worker entry script.
    #[serde(default)]
    pub args: Vec<String>,
}

/// OS-process worker backend speaking line-delimited JSON over stdio.
pub struct ProcessWorkerBackend {
    config: ProcessBackendConfig,
}

impl ProcessWorkerBackend {
    /// Create a backend spawning the configured program.
    pub fn new(config: ProcessBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkerBackend for ProcessWorkerBackend {
    async fn create_worker(
        &self,
        limits: &WorkerLimits,
    ) -> Result<(Box<dyn WorkerHandle>, mpsc::Receiver<WorkerMessage>), SandboxError> {
        let id = format!("worker-{}", Uuid::new_v4());
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env("SANDBOX_MEMORY_LIMIT_MB", limits.memory_mb.to_string())
            .env(
                "SANDBOX_JOB_TIMEOUT_MS",
                limits.job_timeout.as_millis().to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::StartFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::StartFailed("failed to capture stdout".into()))?;

        // stderr goes straight to diagnostics
        if let Some(stderr) = child.stderr.take() {
            let worker_id = id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(worker_id = %worker_id, line = %line, "worker stderr");
                }
            });
        }

        let (tx, rx) = mpsc::channel(64);
        let worker_id = id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<WorkerMessage>(&line) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(worker_id = %worker_id, error = %e, line = %line,
                            "discarding malformed worker message");
                    }
                }
            }
            debug!(worker_id = %worker_id, "worker stdout closed");
        });

        let handle = ProcessWorkerHandle {
            id,
            child,
            stdin: Some(stdin),
        };
        Ok((Box::new(handle), rx))
    }
}

struct ProcessWorkerHandle {
    id: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ProcessWorkerHandle {
    fn signal(&self, signal: nix::sys::signal::Signal) {
        if let Some(pid) = self.child.id() {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal);
        }
    }
}

#[async_trait]
impl WorkerHandle for ProcessWorkerHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.child.id().is_some()
    }

    async fn send_message(&mut self, message: &ManagerMessage) -> Result<(), SandboxError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SandboxError::Protocol("worker stdin already closed".into()))?;
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        stdin.write_all(&line).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), SandboxError> {
        debug!(worker_id = %self.id, "terminating worker");

        // Graceful path: shutdown message, then SIGTERM
        if let Some(mut stdin) = self.stdin.take() {
            if let Ok(mut line) = serde_json::to_vec(&ManagerMessage::Shutdown) {
                line.push(b'\n');
                let _ = stdin.write_all(&line).await;
                let _ = stdin.flush().await;
            }
            // Dropping stdin closes the pipe, another exit cue for the worker
        }
        self.signal(nix::sys::signal::Signal::SIGTERM);

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(worker_id = %self.id, %status, "worker exited gracefully");
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(worker_id = %self.id, "worker survived grace period, force killing");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}
