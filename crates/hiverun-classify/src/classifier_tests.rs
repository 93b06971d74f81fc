use std::collections::HashMap;

use super::*;
use crate::config::ClassifyConfig;
use crate::taxonomy::{ErrorCategory, Recoverability, Severity};

fn classifier() -> ErrorClassifier {
    ErrorClassifier::default()
}

#[test]
fn test_network_error_classification() {
    let c = classifier().classify("ConnectionError", "connection refused by upstream", None);
    assert_eq!(c.category, ErrorCategory::Network);
    assert_eq!(c.recoverability, Recoverability::Automatic);
    assert_eq!(c.severity, Severity::Low);
    assert_eq!(c.confidence_score, 0.7);
}

#[test]
fn test_database_error_is_critical_data_risk() {
    let c = classifier().classify("QueryError", "SQL deadlock detected on transaction", None);
    assert_eq!(c.severity, Severity::Critical);
    assert_eq!(c.category, ErrorCategory::Data);
    assert!(c.data_risk);
    assert!(c.multi_component_impact);
}

#[test]
fn test_infrastructure_error_is_fatal_manual() {
    let c = classifier().classify("ClusterError", "kubernetes node down", None);
    assert_eq!(c.severity, Severity::Fatal);
    assert_eq!(c.category, ErrorCategory::System);
    assert_eq!(c.recoverability, Recoverability::Manual);
    assert!(c.system_non_functional);
}

#[test]
fn test_timeout_is_medium_automatic() {
    let c = classifier().classify("TimeoutError", "operation timed out", None);
    assert_eq!(c.severity, Severity::Medium);
    assert_eq!(c.recoverability, Recoverability::Automatic);
}

#[test]
fn test_repeated_attempts_raise_severity() {
    let ctx = ErrorContext {
        attempt: 5,
        ..Default::default()
    };
    let c = classifier().classify("Error", "mysterious failure", Some(&ctx));
    assert_eq!(c.severity, Severity::High);
    assert_eq!(c.recoverability, Recoverability::Complex);
}

#[test]
fn test_classify_never_panics_with_malformed_context() {
    let clf = classifier();
    let ctx = ErrorContext {
        operation: Some(String::new()),
        component: None,
        tier: None,
        attempt: u32::MAX,
        metadata: HashMap::new(),
    };
    for (error_type, message) in [
        ("", ""),
        ("\u{0}weird", "\u{0}\u{7f}"),
        ("Error", &"x".repeat(10_000)),
        ("Error", &format!("a{}", "é".repeat(100))),
        ("Error", &"日本語エラー".repeat(50)),
    ] {
        let c = clf.classify(error_type, message, Some(&ctx));
        assert!((0.0..=1.0).contains(&c.confidence_score));
    }
    let c = clf.classify("Error", "no context at all", None);
    assert!((0.0..=1.0).contains(&c.confidence_score));
}

#[test]
fn test_signature_shape() {
    let ctx = ErrorContext {
        operation: Some("getRun".into()),
        component: Some("run-store".into()),
        tier: Some("orchestration".into()),
        ..Default::default()
    };
    let c = classifier().classify("StoreError", "Run not found: 42", Some(&ctx));
    assert_eq!(
        c.signature,
        "StoreError::run not found: ##::orchestration::run-store::read"
    );
}

#[test]
fn test_history_is_bounded_per_signature() {
    let clf = ErrorClassifier::new(ClassifyConfig {
        history_limit: 1000,
        ..Default::default()
    });
    let first = clf.classify("Error", "repeated failure", None);
    let signature = first.signature.clone();
    let first_timestamp = first.timestamp;

    for _ in 0..1000 {
        clf.classify("Error", "repeated failure", None);
    }

    assert_eq!(clf.history_len(&signature), 1000);
    // The very first entry was evicted
    let oldest = clf.oldest_in_history(&signature).unwrap();
    assert!(oldest.timestamp >= first_timestamp);
}

#[test]
fn test_pattern_overrides_heuristics() {
    let clf = classifier();
    clf.register_pattern(ErrorPattern {
        id: "p-1".into(),
        name: "flaky upstream".into(),
        fragment: "upstream parser".into(),
        category: ErrorCategory::Validation,
        recoverability: Recoverability::Manual,
        confidence: 0.95,
    });

    let c = clf.classify("Error", "upstream parser rejected payload", None);
    assert_eq!(c.category, ErrorCategory::Validation);
    assert_eq!(c.recoverability, Recoverability::Manual);
    assert_eq!(c.confidence_score, 0.95);
}

#[test]
fn test_pattern_replace_by_id() {
    let clf = classifier();
    for confidence in [0.5, 0.9] {
        clf.register_pattern(ErrorPattern {
            id: "p-1".into(),
            name: "v".into(),
            fragment: "frag".into(),
            category: ErrorCategory::Unknown,
            recoverability: Recoverability::Retry,
            confidence,
        });
    }
    assert_eq!(clf.stats().pattern_count, 1);
    let c = clf.classify("Error", "contains frag here", None);
    assert_eq!(c.confidence_score, 0.9);
}

#[test]
fn test_stats_aggregation() {
    let clf = classifier();
    clf.classify("Error", "one", None);
    clf.classify("Error", "two", None);
    clf.classify("Error", "one", None);

    let stats = clf.stats();
    assert_eq!(stats.total_classifications, 3);
    assert_eq!(stats.unique_signatures, 2);
    assert_eq!(stats.pattern_count, 0);
    assert!((stats.mean_confidence - 0.7).abs() < 1e-9);
}

#[test]
fn test_classify_std_error() {
    let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "request timed out");
    let c = classifier().classify_error(&err, None);
    assert_eq!(c.severity, Severity::Medium);
}
