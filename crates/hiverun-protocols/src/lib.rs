//! # Hiverun Protocols
//!
//! Core contract definitions (traits and shared types) for the hiverun
//! orchestration engine. Contains interface definitions and the data model
//! shared by every other crate - no engine logic.
//!
//! ## Core Traits
//!
//! - [`Navigator`] - Resolves the next steps of a routine
//! - [`BranchCoordinator`] - Runs and rejoins parallel branches
//! - [`StepExecutor`] - Executes a single routine step
//! - [`ContextManager`] - Initializes and updates run context bindings
//! - [`OrganizationGate`] - Pre-flight organizational validation
//! - [`CheckpointManager`] - Checkpoint policy and lifecycle
//! - [`RunStore`] - Run persistence with partial updates
//! - [`EventBus`] - Run lifecycle event distribution

pub mod collaborator;
pub mod error;
pub mod events;
pub mod resources;
pub mod routine;
pub mod run;
pub mod store;

// Re-export core traits and types
pub use collaborator::{
    Branch, BranchCoordinator, BranchOutcome, Checkpoint, CheckpointManager, ContextManager,
    NavigationOutcome, Navigator, OrganizationGate, PathOptimizer, PerformanceInsight,
    PerformanceMonitor, PerformanceReport, StepExecutor, StepOutcome,
};
pub use error::{CollaboratorError, EventError, StoreError};
pub use events::{BroadcastEventBus, EventBus, RunEvent};
pub use resources::{
    ResourceAllocation, ResourceBudget, ResourceError, ResourceLedger, ResourceUsageSample,
};
pub use routine::{Routine, RoutineKind, RoutineStep, StepKind};
pub use run::{ExecutionConfig, Run, RunState};
pub use store::{RunStore, RunUpdate};
