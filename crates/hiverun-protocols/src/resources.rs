//! Resource budgets and the per-swarm resource ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource accounting errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Allocation would exceed the available budget.
    #[error("Insufficient {resource}: requested {requested}, available {available}")]
    Insufficient {
        resource: &'static str,
        requested: u64,
        available: u64,
    },
}

/// A budget across the four tracked resource dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBudget {
    /// Credit budget.
    pub credits: u64,
    /// Wall-clock time budget in seconds.
    pub time_secs: u64,
    /// Memory budget in megabytes.
    pub memory_mb: u64,
    /// Concurrency budget (simultaneous executions).
    pub concurrency: u64,
}

impl ResourceBudget {
    /// Budget with only credits set.
    pub fn credits(credits: u64) -> Self {
        Self {
            credits,
            ..Default::default()
        }
    }

    /// Whether every dimension of `other` fits inside this budget.
    pub fn covers(&self, other: &ResourceBudget) -> bool {
        self.credits >= other.credits
            && self.time_secs >= other.time_secs
            && self.memory_mb >= other.memory_mb
            && self.concurrency >= other.concurrency
    }

    fn checked_sub(&self, other: &ResourceBudget) -> Option<ResourceBudget> {
        Some(ResourceBudget {
            credits: self.credits.checked_sub(other.credits)?,
            time_secs: self.time_secs.checked_sub(other.time_secs)?,
            memory_mb: self.memory_mb.checked_sub(other.memory_mb)?,
            concurrency: self.concurrency.checked_sub(other.concurrency)?,
        })
    }

    fn saturating_add(&self, other: &ResourceBudget) -> ResourceBudget {
        ResourceBudget {
            credits: self.credits.saturating_add(other.credits),
            time_secs: self.time_secs.saturating_add(other.time_secs),
            memory_mb: self.memory_mb.saturating_add(other.memory_mb),
            concurrency: self.concurrency.saturating_add(other.concurrency),
        }
    }
}

/// One recorded allocation against a ledger, tagged with the execution
/// that consumed it. The execution id doubles as an idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    /// Identifier of the delegated execution that consumed the resources.
    pub execution_id: String,
    /// Amount allocated.
    pub amount: ResourceBudget,
    /// Allocation timestamp.
    pub allocated_at: DateTime<Utc>,
}

/// One usage sample recorded into the ledger history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsageSample {
    /// Source of the sample (run id, execution id).
    pub source: String,
    /// Amount used.
    pub amount: ResourceBudget,
    /// Recording timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// The resource ledger of one swarm context.
///
/// Invariants: `available` never exceeds `total`, and the allocated
/// entries always sum to `total - available`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLedger {
    /// Total budget granted at creation.
    pub total: ResourceBudget,
    /// Remaining budget.
    pub available: ResourceBudget,
    /// Recorded allocations.
    pub allocated: Vec<ResourceAllocation>,
    /// Usage history samples.
    pub usage_history: Vec<ResourceUsageSample>,
}

impl ResourceLedger {
    /// Create a ledger where the full budget is available.
    pub fn new(total: ResourceBudget) -> Self {
        Self {
            total,
            available: total,
            allocated: Vec::new(),
            usage_history: Vec::new(),
        }
    }

    /// Charge an allocation against the ledger.
    ///
    /// Idempotent per execution id: a repeated charge for an already
    /// recorded execution is a no-op, so best-effort callers may retry.
    pub fn charge(
        &mut self,
        execution_id: impl Into<String>,
        amount: ResourceBudget,
    ) -> Result<(), ResourceError> {
        let execution_id = execution_id.into();
        if self.allocated.iter().any(|a| a.execution_id == execution_id) {
            return Ok(());
        }
        let remaining = self.available.checked_sub(&amount).ok_or_else(|| {
            let (resource, requested, available) = self.first_shortfall(&amount);
            ResourceError::Insufficient {
                resource,
                requested,
                available,
            }
        })?;
        self.available = remaining;
        self.allocated.push(ResourceAllocation {
            execution_id,
            amount,
            allocated_at: Utc::now(),
        });
        Ok(())
    }

    /// Record a usage sample without changing the balance.
    pub fn record_usage(&mut self, source: impl Into<String>, amount: ResourceBudget) {
        self.usage_history.push(ResourceUsageSample {
            source: source.into(),
            amount,
            recorded_at: Utc::now(),
        });
    }

    /// Total consumed so far (`total - available`).
    pub fn consumed(&self) -> ResourceBudget {
        self.total
            .checked_sub(&self.available)
            .unwrap_or_default()
    }

    /// Fraction of credits consumed, in [0, 1]. Zero-total ledgers report 0.
    pub fn consumed_ratio(&self) -> f64 {
        if self.total.credits == 0 {
            return 0.0;
        }
        self.consumed().credits as f64 / self.total.credits as f64
    }

    /// Verify the ledger invariants hold.
    pub fn invariants_hold(&self) -> bool {
        let allocated_sum = self
            .allocated
            .iter()
            .fold(ResourceBudget::default(), |acc, a| {
                acc.saturating_add(&a.amount)
            });
        self.total.covers(&self.available) && allocated_sum == self.consumed()
    }

    fn first_shortfall(&self, amount: &ResourceBudget) -> (&'static str, u64, u64) {
        if amount.credits > self.available.credits {
            ("credits", amount.credits, self.available.credits)
        } else if amount.time_secs > self.available.time_secs {
            ("time_secs", amount.time_secs, self.available.time_secs)
        } else if amount.memory_mb > self.available.memory_mb {
            ("memory_mb", amount.memory_mb, self.available.memory_mb)
        } else {
            ("concurrency", amount.concurrency, self.available.concurrency)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ledger_is_fully_available() {
        let ledger = ResourceLedger::new(ResourceBudget::credits(100));
        assert_eq!(ledger.total, ledger.available);
        assert!(ledger.allocated.is_empty());
        assert!(ledger.invariants_hold());
    }

    #[test]
    fn test_charge_updates_balance_and_allocations() {
        let mut ledger = ResourceLedger::new(ResourceBudget::credits(100));
        ledger.charge("exec-1", ResourceBudget::credits(30)).unwrap();
        assert_eq!(ledger.available.credits, 70);
        assert_eq!(ledger.allocated.len(), 1);
        assert_eq!(ledger.consumed().credits, 30);
        assert!(ledger.invariants_hold());
    }

    #[test]
    fn test_charge_is_idempotent_per_execution_id() {
        let mut ledger = ResourceLedger::new(ResourceBudget::credits(100));
        ledger.charge("exec-1", ResourceBudget::credits(30)).unwrap();
        ledger.charge("exec-1", ResourceBudget::credits(30)).unwrap();
        assert_eq!(ledger.available.credits, 70);
        assert_eq!(ledger.allocated.len(), 1);
    }

    #[test]
    fn test_charge_rejects_overdraw() {
        let mut ledger = ResourceLedger::new(ResourceBudget::credits(10));
        let err = ledger
            .charge("exec-1", ResourceBudget::credits(11))
            .unwrap_err();
        assert!(err.to_string().contains("Insufficient credits"));
        // Failed charge leaves the ledger untouched
        assert_eq!(ledger.available.credits, 10);
        assert!(ledger.allocated.is_empty());
        assert!(ledger.invariants_hold());
    }

    #[test]
    fn test_consumed_ratio_zero_total() {
        let ledger = ResourceLedger::new(ResourceBudget::default());
        assert_eq!(ledger.consumed_ratio(), 0.0);
    }
}
