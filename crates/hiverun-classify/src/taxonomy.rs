//! Error taxonomy produced by classification.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How severe a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Routine, low-impact failure.
    Low,
    /// Noticeable but contained failure.
    Medium,
    /// Repeated or persistent failure.
    High,
    /// Failure in a critical dependency.
    Critical,
    /// Infrastructure-level failure.
    Fatal,
    /// Generic error severity.
    Error,
}

/// What kind of failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCategory {
    /// Network or connectivity failure.
    Network,
    /// Database or data-layer failure.
    Data,
    /// Input or schema validation failure.
    Validation,
    /// Infrastructure or platform failure.
    System,
    /// Unclassifiable failure.
    Unknown,
}

/// How the failure can be recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recoverability {
    /// A plain retry is likely to succeed.
    Retry,
    /// Transient; automatic recovery (backoff, reconnect) applies.
    Automatic,
    /// Recovery needs a multi-step strategy.
    Complex,
    /// A human has to intervene.
    Manual,
    /// Partial recovery at best.
    Partial,
}

/// A structured classification of one failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Severity rating.
    pub severity: Severity,
    /// Failure category.
    pub category: ErrorCategory,
    /// Recovery strategy hint.
    pub recoverability: Recoverability,
    /// The failure leaves the system non-functional.
    pub system_non_functional: bool,
    /// The failure impacts multiple components.
    pub multi_component_impact: bool,
    /// The failure risks data loss or corruption.
    pub data_risk: bool,
    /// The failure has security implications.
    pub security_risk: bool,
    /// Classifier confidence, in [0, 1].
    pub confidence_score: f64,
    /// Classification timestamp.
    pub timestamp: DateTime<Utc>,
    /// Signature the classification is archived under.
    pub signature: String,
    /// Free-form metadata about the classification.
    pub metadata: HashMap<String, Value>,
}
