//! Run engine errors.

use thiserror::Error;

use hiverun_protocols::{CollaboratorError, EventError, RoutineKind, RunState, StoreError};

/// Run engine error types.
#[derive(Debug, Error)]
pub enum RunError {
    /// The organization gate rejected the routine; no run was created.
    #[error("MOISE organization validation failed")]
    OrganizationValidation,

    /// Illegal state transition requested.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the run is in.
        from: RunState,
        /// State that was requested.
        to: RunState,
    },

    /// No navigator registered for the routine's kind.
    #[error("No navigator registered for routine kind: {0}")]
    NavigatorNotFound(RoutineKind),

    /// Run record missing from the store.
    #[error("Run not found: {0}")]
    RunNotFound(uuid::Uuid),

    /// Collaborator failure.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Event publication failure.
    #[error(transparent)]
    Event(#[from] EventError),
}
