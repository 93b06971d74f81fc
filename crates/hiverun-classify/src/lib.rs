//! # Hiverun Classify
//!
//! Heuristic error classification engine. Turns raw failures into a
//! structured taxonomy (severity, category, recoverability, risk flags)
//! that drives recovery decisions elsewhere in the engine.
//!
//! ## Features
//!
//! - Feature extraction from error messages and types
//! - Fixed heuristic rules for severity/category/recoverability
//! - Bounded per-signature classification history
//! - Learned pattern registration for future classifications
//! - Never fails outward: internal errors degrade to a fallback

pub mod classifier;
pub mod config;
pub mod features;
pub mod taxonomy;

pub use classifier::{ClassifierStats, ErrorClassifier, ErrorContext, ErrorPattern};
pub use config::ClassifyConfig;
pub use features::{ErrorFeatures, OperationCategory};
pub use taxonomy::{Classification, ErrorCategory, Recoverability, Severity};
