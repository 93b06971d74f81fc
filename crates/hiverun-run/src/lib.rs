//! # Hiverun Run
//!
//! The per-run state machine of the hiverun orchestration engine.
//!
//! ## Features
//!
//! - Drives one run through navigation, branching, step execution,
//!   error handling and finalization
//! - Organization-gate validation before any state is created
//! - Opportunistic checkpointing with pluggable stores
//! - Recovery from the latest checkpoint after a crash
//! - In-memory run store for tests and single-process deployments

pub mod checkpoint;
pub mod error;
pub mod machine;
pub mod recovery;
pub mod store;

pub use checkpoint::{CheckpointConfig, CheckpointStore, MemoryCheckpointStore, PolicyCheckpointManager};
pub use error::RunError;
pub use machine::{RunCollaborators, RunStateMachine};
pub use recovery::{RecoveredState, RecoveryManager};
pub use store::MemoryRunStore;
