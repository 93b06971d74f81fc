//! # Hiverun Swarm
//!
//! The coordination layer of the hiverun orchestration engine.
//!
//! A "swarm" is a shared execution context: a resource ledger, a
//! key-value blackboard, and an execution-state summary spanning one or
//! more runs. The [`SwarmCoordinator`] is the top-level entry point for
//! execution requests:
//!
//! - **Coordination-creation** requests create a swarm context, start a
//!   run state machine and return identifiers immediately.
//! - **Delegated-execution** requests forward work to a routine
//!   executor and report consumed resources back onto the parent
//!   swarm's ledger, best-effort.

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod request;

pub use config::SwarmConfig;
pub use context::{ExecutionSummary, SwarmContext, SwarmStatus};
pub use coordinator::{
    ActiveExecution, Capabilities, ExecutionStatus, RoutineExecutor, SwarmCoordinator,
};
pub use error::SwarmError;
pub use request::{
    CoordinationRequest, CreditLimit, DelegatedRequest, ExecuteOutcome, ExecuteRequest,
    ResourceRequest,
};
