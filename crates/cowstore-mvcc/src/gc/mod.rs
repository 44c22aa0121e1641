//! Node budget and reclamation statistics.
//!
//! Reclamation in cowstore is synchronous and on demand: nothing runs in the
//! background. Two things trigger it:
//!
//! - An explicit `cleanup_snapshots()` call by the owner of the tree
//! - The [`NodeBudget`] running dry while a transaction allocates nodes
//!
//! The budget is a simple backpressure valve. Each allocation charges it,
//! each freed node refunds it (up to the configured maximum), and an
//! allocation that would overdraw it runs a cleanup first. This bounds how
//! much discarded structure can accumulate between passes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Allocation budget between reclamation passes.
#[derive(Debug, Clone)]
pub struct NodeBudget {
    /// Allocations left before a cleanup is forced.
    remaining: usize,
    /// Upper bound for refunds.
    max: usize,
}

impl NodeBudget {
    /// Creates a full budget.
    pub fn new(max: usize) -> Self {
        Self {
            remaining: max,
            max,
        }
    }

    /// Returns the allocations left before a cleanup is forced.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Returns the configured maximum.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Returns true if allocating `count` more nodes would overdraw the budget.
    pub fn would_exceed(&self, count: usize) -> bool {
        self.remaining < count
    }

    /// Charges `count` allocations, saturating at zero.
    pub fn charge(&mut self, count: usize) {
        self.remaining = self.remaining.saturating_sub(count);
    }

    /// Refunds `count` freed nodes, capped at the maximum.
    pub fn refund(&mut self, count: usize) {
        self.remaining = self.remaining.saturating_add(count).min(self.max);
    }
}

/// Statistics about reclamation.
#[derive(Debug, Default)]
pub struct GcStats {
    /// Total number of cleanup passes.
    pub runs: AtomicU64,
    /// Passes triggered by the node budget rather than by the caller.
    pub budget_runs: AtomicU64,
    /// Total log entries removed.
    pub snapshots_removed: AtomicU64,
    /// Total nodes freed, including rollbacks.
    pub nodes_freed: AtomicU64,
}

impl GcStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cleanup pass.
    pub fn record_run(&self, result: &GcResult, from_budget: bool) {
        self.runs.fetch_add(1, AtomicOrdering::Relaxed);
        if from_budget {
            self.budget_runs.fetch_add(1, AtomicOrdering::Relaxed);
        }
        self.snapshots_removed
            .fetch_add(result.snapshots_removed as u64, AtomicOrdering::Relaxed);
        self.nodes_freed
            .fetch_add(result.nodes_freed as u64, AtomicOrdering::Relaxed);
    }

    /// Records nodes freed outside a cleanup pass (rollback, merge).
    pub fn record_freed(&self, nodes: usize) {
        self.nodes_freed
            .fetch_add(nodes as u64, AtomicOrdering::Relaxed);
    }

    /// Returns the total number of runs.
    pub fn total_runs(&self) -> u64 {
        self.runs.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of budget-triggered runs.
    pub fn total_budget_runs(&self) -> u64 {
        self.budget_runs.load(AtomicOrdering::Relaxed)
    }

    /// Returns the total log entries removed.
    pub fn total_snapshots_removed(&self) -> u64 {
        self.snapshots_removed.load(AtomicOrdering::Relaxed)
    }

    /// Returns the total nodes freed.
    pub fn total_nodes_freed(&self) -> u64 {
        self.nodes_freed.load(AtomicOrdering::Relaxed)
    }
}

impl fmt::Display for GcStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "runs={} budget_runs={} snapshots_removed={} nodes_freed={}",
            self.total_runs(),
            self.total_budget_runs(),
            self.total_snapshots_removed(),
            self.total_nodes_freed()
        )
    }
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcResult {
    /// Number of log entries removed.
    pub snapshots_removed: usize,
    /// Number of nodes freed.
    pub nodes_freed: usize,
}

impl GcResult {
    /// Returns true if any work was done.
    pub fn did_work(&self) -> bool {
        self.snapshots_removed > 0 || self.nodes_freed > 0
    }

    /// Adds another result into this one.
    pub fn merge(&mut self, other: GcResult) {
        self.snapshots_removed += other.snapshots_removed;
        self.nodes_freed += other.nodes_freed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_charge_and_refund() {
        let mut budget = NodeBudget::new(4);
        assert_eq!(budget.remaining(), 4);
        assert!(!budget.would_exceed(4));
        assert!(budget.would_exceed(5));

        budget.charge(3);
        assert_eq!(budget.remaining(), 1);
        assert!(budget.would_exceed(2));

        budget.charge(5);
        assert_eq!(budget.remaining(), 0); // Saturating

        budget.refund(2);
        assert_eq!(budget.remaining(), 2);

        budget.refund(100);
        assert_eq!(budget.remaining(), budget.max()); // Capped
    }

    #[test]
    fn test_gc_stats_recording() {
        let stats = GcStats::new();
        let result = GcResult {
            snapshots_removed: 2,
            nodes_freed: 7,
        };

        stats.record_run(&result, false);
        stats.record_run(&result, true);
        stats.record_freed(3);

        assert_eq!(stats.total_runs(), 2);
        assert_eq!(stats.total_budget_runs(), 1);
        assert_eq!(stats.total_snapshots_removed(), 4);
        assert_eq!(stats.total_nodes_freed(), 17);
        assert!(stats.to_string().contains("nodes_freed=17"));
    }

    #[test]
    fn test_gc_result_merge() {
        let mut total = GcResult::default();
        assert!(!total.did_work());

        total.merge(GcResult {
            snapshots_removed: 1,
            nodes_freed: 3,
        });
        total.merge(GcResult {
            snapshots_removed: 0,
            nodes_freed: 2,
        });

        assert!(total.did_work());
        assert_eq!(total.snapshots_removed, 1);
        assert_eq!(total.nodes_freed, 5);
    }
}
