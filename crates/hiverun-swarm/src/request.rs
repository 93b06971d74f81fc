//! Execution requests and their outcomes.
//!
//! The coordinator discriminates the two request shapes by structure,
//! not by an explicit discriminator field: a coordination-creation
//! request carries a routine and a resource request, a delegated
//! request carries a routine id and an execution id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use hiverun_protocols::{ExecutionConfig, ResourceBudget, Routine};

use crate::config::SwarmConfig;

/// A credit limit that may be a number or the literal `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditLimit {
    /// A fixed credit budget.
    Limited(u64),
    /// Unlimited, resolved against the configured ceiling.
    Unlimited,
}

impl CreditLimit {
    /// Resolve to a concrete credit count.
    pub fn ceiling(&self, config: &SwarmConfig) -> u64 {
        match self {
            CreditLimit::Limited(credits) => *credits,
            CreditLimit::Unlimited => config.unlimited_credits_ceiling,
        }
    }
}

impl Serialize for CreditLimit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            CreditLimit::Limited(credits) => serializer.serialize_u64(*credits),
            CreditLimit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for CreditLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(credits) => Ok(CreditLimit::Limited(credits)),
            Raw::Text(text) if text.eq_ignore_ascii_case("unlimited") => {
                Ok(CreditLimit::Unlimited)
            }
            Raw::Text(text) => Err(serde::de::Error::custom(format!(
                "invalid credit limit: {text}"
            ))),
        }
    }
}

/// Resources requested at swarm creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Credit budget, possibly `"unlimited"`.
    pub max_credits: CreditLimit,
    /// Time budget in seconds; config default when omitted.
    #[serde(default)]
    pub time_secs: Option<u64>,
    /// Memory budget in megabytes; config default when omitted.
    #[serde(default)]
    pub memory_mb: Option<u64>,
    /// Concurrency budget; config default when omitted.
    #[serde(default)]
    pub concurrency: Option<u64>,
}

impl ResourceRequest {
    /// Resolve the request into a concrete budget.
    pub fn resolve(&self, config: &SwarmConfig) -> ResourceBudget {
        ResourceBudget {
            credits: self.max_credits.ceiling(config),
            time_secs: self.time_secs.unwrap_or(config.default_time_budget_secs),
            memory_mb: self.memory_mb.unwrap_or(config.default_memory_budget_mb),
            concurrency: self
                .concurrency
                .unwrap_or(config.default_concurrency_budget),
        }
    }
}

/// A coordination-creation request: create a swarm and start a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationRequest {
    /// The goal recorded on the swarm's blackboard.
    pub goal: String,
    /// Requesting user.
    pub user: String,
    /// The routine the new run executes.
    pub routine: Routine,
    /// Execution configuration for the run.
    #[serde(default)]
    pub config: ExecutionConfig,
    /// Resources granted to the swarm.
    pub resources: ResourceRequest,
}

/// A delegated-execution request: forward work and report resource
/// consumption against a parent swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedRequest {
    /// Routine identity attached to the forwarded request.
    pub routine_id: String,
    /// Idempotency key for the parent's resource ledger.
    pub execution_id: String,
    /// Parent swarm charged for the execution, if any.
    #[serde(default)]
    pub parent_swarm_id: Option<String>,
    /// Request payload, forwarded unmodified.
    #[serde(default)]
    pub payload: Value,
}

/// One of the two request shapes the coordinator accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteRequest {
    /// Create a swarm and start a run.
    Coordination(CoordinationRequest),
    /// Forward work to the routine executor.
    Delegated(DelegatedRequest),
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecuteOutcome {
    /// Identifiers of the newly created swarm; the run itself proceeds
    /// asynchronously.
    Coordination {
        /// New swarm id.
        swarm_id: String,
        /// Id of the started run.
        run_id: Uuid,
        /// Conversation id assigned to the run.
        conversation_id: String,
    },
    /// Result of a delegated execution.
    Delegated {
        /// Execution id the result belongs to.
        execution_id: String,
        /// Executor result.
        result: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_limit_accepts_unlimited_string() {
        let limit: CreditLimit = serde_json::from_str(r#""unlimited""#).unwrap();
        assert_eq!(limit, CreditLimit::Unlimited);

        let limit: CreditLimit = serde_json::from_str("250").unwrap();
        assert_eq!(limit, CreditLimit::Limited(250));

        assert!(serde_json::from_str::<CreditLimit>(r#""bottomless""#).is_err());
    }

    #[test]
    fn test_credit_limit_resolves_against_config() {
        let config = SwarmConfig::default();
        assert_eq!(CreditLimit::Limited(42).ceiling(&config), 42);
        assert_eq!(
            CreditLimit::Unlimited.ceiling(&config),
            config.unlimited_credits_ceiling
        );
    }

    #[test]
    fn test_resource_request_fills_defaults() {
        let config = SwarmConfig::default();
        let request: ResourceRequest =
            serde_json::from_str(r#"{"max_credits": "unlimited", "memory_mb": 128}"#).unwrap();
        let budget = request.resolve(&config);
        assert_eq!(budget.credits, config.unlimited_credits_ceiling);
        assert_eq!(budget.memory_mb, 128);
        assert_eq!(budget.time_secs, config.default_time_budget_secs);
    }

    #[test]
    fn test_request_shapes_discriminate_by_structure() {
        let delegated = r#"{
            "routine_id": "r-1",
            "execution_id": "exec-1",
            "payload": {"input": 1}
        }"#;
        match serde_json::from_str::<ExecuteRequest>(delegated).unwrap() {
            ExecuteRequest::Delegated(req) => {
                assert_eq!(req.routine_id, "r-1");
                assert!(req.parent_swarm_id.is_none());
            }
            other => panic!("wrong shape: {other:?}"),
        }
    }
}
