//! The classification engine.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ClassifyConfig;
use crate::features::{ErrorFeatures, OperationCategory};
use crate::taxonomy::{Classification, ErrorCategory, Recoverability, Severity};

/// Context for a classification call.
///
/// Every field is optional; the classifier tolerates missing or
/// malformed context.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Name of the operation that failed.
    pub operation: Option<String>,
    /// Component the failure occurred in.
    pub component: Option<String>,
    /// Deployment tier (orchestration, execution, sandbox).
    pub tier: Option<String>,
    /// How many attempts have been made so far.
    pub attempt: u32,
    /// Free-form metadata carried into the classification.
    pub metadata: HashMap<String, Value>,
}

/// A learned pattern that overrides heuristic classification when its
/// fragment matches the error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPattern {
    /// Pattern identifier; registering with an existing id replaces it.
    pub id: String,
    /// Human-readable pattern name.
    pub name: String,
    /// Substring matched against the error signature and message.
    pub fragment: String,
    /// Category to assign on match.
    pub category: ErrorCategory,
    /// Recoverability to assign on match.
    pub recoverability: Recoverability,
    /// Confidence to assign on match.
    pub confidence: f64,
}

/// Aggregate classifier statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierStats {
    /// Total classifications performed.
    pub total_classifications: u64,
    /// Number of distinct error signatures seen.
    pub unique_signatures: usize,
    /// Number of registered patterns.
    pub pattern_count: usize,
    /// Mean confidence across all classifications.
    pub mean_confidence: f64,
}

#[derive(Default)]
struct StatsAccumulator {
    count: u64,
    confidence_sum: f64,
}

/// The heuristic error classifier.
///
/// `classify` never fails outward: any internal failure degrades to a
/// low-confidence fallback classification.
pub struct ErrorClassifier {
    config: ClassifyConfig,
    history: DashMap<String, VecDeque<Classification>>,
    patterns: RwLock<HashMap<String, ErrorPattern>>,
    stats: Mutex<StatsAccumulator>,
}

impl ErrorClassifier {
    /// Create a classifier with the given configuration.
    pub fn new(config: ClassifyConfig) -> Self {
        Self {
            config,
            history: DashMap::new(),
            patterns: RwLock::new(HashMap::new()),
            stats: Mutex::new(StatsAccumulator::default()),
        }
    }

    /// Classify a failure described by its error type and message.
    pub fn classify(
        &self,
        error_type: &str,
        message: &str,
        context: Option<&ErrorContext>,
    ) -> Classification {
        let classification = match self.try_classify(error_type, message, context) {
            Ok(c) => c,
            Err(reason) => {
                warn!(%reason, "classification degraded to fallback");
                self.fallback(error_type, message)
            }
        };
        self.archive(&classification);
        classification
    }

    /// Classify a standard error value.
    pub fn classify_error(
        &self,
        error: &(dyn std::error::Error + 'static),
        context: Option<&ErrorContext>,
    ) -> Classification {
        self.classify("Error", &error.to_string(), context)
    }

    /// Register a learned pattern, replacing any pattern with the same id.
    pub fn register_pattern(&self, pattern: ErrorPattern) {
        debug!(id = %pattern.id, name = %pattern.name, "registering error pattern");
        self.patterns.write().insert(pattern.id.clone(), pattern);
    }

    /// Aggregate statistics over everything classified so far.
    pub fn stats(&self) -> ClassifierStats {
        let accum = self.stats.lock();
        let mean_confidence = if accum.count == 0 {
            0.0
        } else {
            accum.confidence_sum / accum.count as f64
        };
        ClassifierStats {
            total_classifications: accum.count,
            unique_signatures: self.history.len(),
            pattern_count: self.patterns.read().len(),
            mean_confidence,
        }
    }

    /// Number of archived classifications for one signature.
    pub fn history_len(&self, signature: &str) -> usize {
        self.history.get(signature).map(|h| h.len()).unwrap_or(0)
    }

    /// Oldest archived classification for one signature.
    pub fn oldest_in_history(&self, signature: &str) -> Option<Classification> {
        self.history
            .get(signature)
            .and_then(|h| h.front().cloned())
    }

    fn try_classify(
        &self,
        error_type: &str,
        message: &str,
        context: Option<&ErrorContext>,
    ) -> Result<Classification, String> {
        let features = ErrorFeatures::extract(error_type, message);
        let op_category = context
            .and_then(|c| c.operation.as_deref())
            .map(OperationCategory::from_operation)
            .unwrap_or(OperationCategory::Other);
        let attempt = context.map(|c| c.attempt).unwrap_or(0);
        let signature = self.signature(error_type, message, context, op_category);

        let severity = if features.infrastructure {
            Severity::Fatal
        } else if features.database {
            Severity::Critical
        } else if attempt > self.config.persistent_attempts {
            Severity::High
        } else if features.timeout {
            Severity::Medium
        } else {
            Severity::Low
        };

        let mut category = if features.network {
            ErrorCategory::Network
        } else if features.database {
            ErrorCategory::Data
        } else if features.validation {
            ErrorCategory::Validation
        } else if features.infrastructure {
            ErrorCategory::System
        } else {
            ErrorCategory::Unknown
        };

        let mut recoverability = if features.infrastructure {
            Recoverability::Manual
        } else if attempt > self.config.persistent_attempts {
            Recoverability::Complex
        } else if features.timeout || features.network {
            Recoverability::Automatic
        } else {
            Recoverability::Retry
        };

        let mut confidence = self.config.base_confidence;

        // A matching learned pattern overrides the heuristics
        if let Some(pattern) = self.matching_pattern(&signature, message) {
            debug!(pattern = %pattern.id, %signature, "pattern match overrides heuristics");
            category = pattern.category;
            recoverability = pattern.recoverability;
            confidence = pattern.confidence.clamp(0.0, 1.0);
        }

        let mut metadata = context.map(|c| c.metadata.clone()).unwrap_or_default();
        metadata.insert("error_type".into(), json!(error_type));
        metadata.insert("op_category".into(), json!(op_category.to_string()));
        metadata.insert("attempt".into(), json!(attempt));
        if let Some(status) = features.http_status_guess(message) {
            metadata.insert("http_status_guess".into(), json!(status));
        }

        Ok(Classification {
            severity,
            category,
            recoverability,
            system_non_functional: features.infrastructure,
            multi_component_impact: features.infrastructure || features.database,
            data_risk: features.database
                || (features.filesystem
                    && matches!(
                        op_category,
                        OperationCategory::Write
                            | OperationCategory::Update
                            | OperationCategory::Delete
                    )),
            security_risk: features.auth,
            confidence_score: confidence,
            timestamp: Utc::now(),
            signature,
            metadata,
        })
    }

    /// Fixed fallback classification when the pipeline itself fails.
    fn fallback(&self, error_type: &str, message: &str) -> Classification {
        Classification {
            severity: Severity::Error,
            category: ErrorCategory::Unknown,
            recoverability: Recoverability::Partial,
            system_non_functional: false,
            multi_component_impact: false,
            data_risk: false,
            security_risk: false,
            confidence_score: self.config.fallback_confidence,
            timestamp: Utc::now(),
            signature: self.signature(error_type, message, None, OperationCategory::Other),
            metadata: HashMap::new(),
        }
    }

    fn signature(
        &self,
        error_type: &str,
        message: &str,
        context: Option<&ErrorContext>,
        op_category: OperationCategory,
    ) -> String {
        let tier = context
            .and_then(|c| c.tier.as_deref())
            .unwrap_or("unknown");
        let component = context
            .and_then(|c| c.component.as_deref())
            .unwrap_or("unknown");
        format!(
            "{}::{}::{}::{}::{}",
            error_type,
            normalize_message(message),
            tier,
            component,
            op_category
        )
    }

    fn matching_pattern(&self, signature: &str, message: &str) -> Option<ErrorPattern> {
        let patterns = self.patterns.read();
        patterns
            .values()
            .find(|p| {
                !p.fragment.is_empty()
                    && (signature.contains(&p.fragment) || message.contains(&p.fragment))
            })
            .cloned()
    }

    fn archive(&self, classification: &Classification) {
        let mut entry = self
            .history
            .entry(classification.signature.clone())
            .or_default();
        entry.push_back(classification.clone());
        while entry.len() > self.config.history_limit {
            entry.pop_front();
        }
        drop(entry);

        let mut accum = self.stats.lock();
        accum.count += 1;
        accum.confidence_sum += classification.confidence_score;
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(ClassifyConfig::default())
    }
}

/// Normalize a message for signature purposes: lowercase, digits folded,
/// bounded length (at most 120 characters).
fn normalize_message(message: &str) -> String {
    let normalized: String = message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_digit() { '#' } else { c })
        .take(120)
        .collect();
    normalized.trim().to_string()
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
