//! Coordination layer errors.

use thiserror::Error;

use hiverun_protocols::{CollaboratorError, ResourceError};
use hiverun_run::RunError;

/// Coordination layer error types.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// No swarm context exists under the given id.
    #[error("Swarm not found: {0}")]
    SwarmNotFound(String),

    /// The active-swarm ceiling has been reached.
    #[error("Swarm capacity exhausted: {active} active, limit {limit}")]
    AtCapacity {
        /// Currently active swarms.
        active: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// Resource accounting failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The underlying run failed to start or transition.
    #[error(transparent)]
    Run(#[from] RunError),

    /// The routine-execution collaborator failed.
    #[error(transparent)]
    Executor(#[from] CollaboratorError),
}

impl SwarmError {
    /// Stable machine-readable code for external callers.
    pub fn code(&self) -> &'static str {
        match self {
            SwarmError::SwarmNotFound(_) => "SWARM_NOT_FOUND",
            SwarmError::AtCapacity { .. } => "SWARM_AT_CAPACITY",
            SwarmError::Resource(_) => "RESOURCE_EXHAUSTED",
            SwarmError::Run(_) => "RUN_FAILED",
            SwarmError::Executor(_) => "EXECUTOR_FAILED",
        }
    }
}
