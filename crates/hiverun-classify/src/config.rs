//! Classifier configuration.

use serde::{Deserialize, Serialize};

/// Classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Maximum history entries kept per error signature.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Confidence assigned to successful heuristic classifications.
    #[serde(default = "default_base_confidence")]
    pub base_confidence: f64,

    /// Confidence assigned to the fallback classification.
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,

    /// Attempt count above which failures are considered persistent.
    #[serde(default = "default_persistent_attempts")]
    pub persistent_attempts: u32,
}

fn default_history_limit() -> usize {
    1000
}

fn default_base_confidence() -> f64 {
    0.7
}

fn default_fallback_confidence() -> f64 {
    0.3
}

fn default_persistent_attempts() -> u32 {
    3
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            base_confidence: default_base_confidence(),
            fallback_confidence: default_fallback_confidence(),
            persistent_attempts: default_persistent_attempts(),
        }
    }
}
