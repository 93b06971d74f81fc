//! Coordination layer configuration.

use serde::{Deserialize, Serialize};

/// Coordination layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Credit ceiling substituted for "unlimited" resource requests.
    #[serde(default = "default_unlimited_credits_ceiling")]
    pub unlimited_credits_ceiling: u64,

    /// Maximum number of concurrently active swarms.
    #[serde(default = "default_max_concurrent_swarms")]
    pub max_concurrent_swarms: usize,

    /// Default time budget in seconds for requests that omit one.
    #[serde(default = "default_time_budget_secs")]
    pub default_time_budget_secs: u64,

    /// Default memory budget in megabytes for requests that omit one.
    #[serde(default = "default_memory_budget_mb")]
    pub default_memory_budget_mb: u64,

    /// Default concurrency budget for requests that omit one.
    #[serde(default = "default_concurrency_budget")]
    pub default_concurrency_budget: u64,

    /// Credits charged against the parent ledger per delegated execution.
    #[serde(default = "default_delegated_execution_credits")]
    pub delegated_execution_credits: u64,
}

fn default_unlimited_credits_ceiling() -> u64 {
    1_000_000
}

fn default_max_concurrent_swarms() -> usize {
    64
}

fn default_time_budget_secs() -> u64 {
    3_600
}

fn default_memory_budget_mb() -> u64 {
    4_096
}

fn default_concurrency_budget() -> u64 {
    8
}

fn default_delegated_execution_credits() -> u64 {
    1
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            unlimited_credits_ceiling: default_unlimited_credits_ceiling(),
            max_concurrent_swarms: default_max_concurrent_swarms(),
            default_time_budget_secs: default_time_budget_secs(),
            default_memory_budget_mb: default_memory_budget_mb(),
            default_concurrency_budget: default_concurrency_budget(),
            delegated_execution_credits: default_delegated_execution_credits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.unlimited_credits_ceiling, 1_000_000);
        assert_eq!(config.max_concurrent_swarms, 64);
        assert_eq!(config.delegated_execution_credits, 1);
    }

    #[test]
    fn test_deserialize_with_partial_fields() {
        let config: SwarmConfig =
            serde_json::from_str(r#"{"max_concurrent_swarms": 4}"#).unwrap();
        assert_eq!(config.max_concurrent_swarms, 4);
        assert_eq!(config.unlimited_credits_ceiling, 1_000_000);
    }
}
