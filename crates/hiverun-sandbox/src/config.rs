//! Sandbox configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sandbox manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Languages this manager accepts jobs for.
    #[serde(default = "default_supported_languages")]
    pub supported_languages: Vec<String>,

    /// Default per-job deadline in milliseconds, used when a job does
    /// not carry its own.
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,

    /// How long a freshly spawned worker may take to report ready.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Interval between heartbeat liveness checks.
    #[serde(default = "default_heartbeat_check_ms")]
    pub heartbeat_check_ms: u64,

    /// A worker that has not been heard from for this long is treated
    /// as crashed.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// How long an idle worker is kept alive once the queue drains.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Grace period between the graceful-shutdown signal and force kill.
    #[serde(default = "default_termination_grace_ms")]
    pub termination_grace_ms: u64,

    /// Memory ceiling passed to the worker process at spawn time.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,

    /// Consecutive crash-restart attempts before queued jobs are
    /// rejected (0 = unbounded).
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_supported_languages() -> Vec<String> {
    vec!["javascript".to_string(), "typescript".to_string()]
}

fn default_job_timeout_ms() -> u64 {
    30_000
}

fn default_ready_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_check_ms() -> u64 {
    1_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_termination_grace_ms() -> u64 {
    2_000
}

fn default_memory_limit_mb() -> u64 {
    512
}

fn default_max_restarts() -> u32 {
    5
}

impl SandboxConfig {
    /// Whether the given language is accepted by this manager.
    pub fn supports_language(&self, language: &str) -> bool {
        self.supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }

    /// Default job deadline as a [`Duration`].
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// Worker-ready deadline as a [`Duration`].
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Heartbeat check interval as a [`Duration`].
    pub fn heartbeat_check(&self) -> Duration {
        Duration::from_millis(self.heartbeat_check_ms)
    }

    /// Heartbeat liveness deadline as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Idle teardown deadline as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Termination grace period as a [`Duration`].
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            supported_languages: default_supported_languages(),
            job_timeout_ms: default_job_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            heartbeat_check_ms: default_heartbeat_check_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            termination_grace_ms: default_termination_grace_ms(),
            memory_limit_mb: default_memory_limit_mb(),
            max_restarts: default_max_restarts(),
        }
    }
}
