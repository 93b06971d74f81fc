//! # Hiverun Sandbox
//!
//! Process-isolation manager for running untrusted routine code.
//!
//! ## Features
//!
//! - One isolated OS worker process per manager instance, one job in flight
//! - FIFO job queue with per-job deadlines
//! - Three independent timeout mechanisms: worker-ready, heartbeat, job
//! - Crash detection with automatic worker restart
//! - Graceful termination raced against a force-kill grace period
//! - Line-delimited JSON wire protocol with a structured value codec

pub mod codec;
pub mod config;
pub mod error;
pub mod job;
pub mod manager;
pub mod protocol;
pub mod worker;

pub use config::SandboxConfig;
pub use error::SandboxError;
pub use job::SandboxJob;
pub use manager::SandboxManager;
pub use protocol::{ManagerMessage, WorkerMessage};
pub use worker::{
    ProcessBackendConfig, ProcessWorkerBackend, WorkerBackend, WorkerHandle, WorkerLimits,
    WorkerStatus,
};
