//! Shared error types for the protocol contracts.

use thiserror::Error;

/// Errors raised by collaborator implementations.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Collaborator could not reach a backing service.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Collaborator rejected its input.
    #[error("Invalid collaborator input: {0}")]
    InvalidInput(String),

    /// Collaborator failed while doing its work.
    #[error("Collaborator failed: {0}")]
    Failed(String),
}

/// Errors raised by run stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No run with the given id exists.
    #[error("Run not found: {0}")]
    RunNotFound(uuid::Uuid),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised by the event bus.
#[derive(Debug, Error)]
pub enum EventError {
    /// Event could not be published.
    #[error("Failed to publish event: {0}")]
    Publish(String),
}
