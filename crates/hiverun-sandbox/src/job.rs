//! Sandbox jobs.

use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

/// One unit of untrusted code to run in the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxJob {
    /// Job identifier.
    pub id: Uuid,
    /// Source code to execute.
    pub code: String,
    /// Code language.
    pub language: String,
    /// Input value handed to the code.
    pub input: Value,
    /// Per-job deadline; the manager default applies when absent.
    pub timeout: Option<Duration>,
}

impl SandboxJob {
    /// Create a job with a fresh id and no explicit deadline.
    pub fn new(code: impl Into<String>, language: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            language: language.into(),
            input,
            timeout: None,
        }
    }

    /// Set an explicit deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
