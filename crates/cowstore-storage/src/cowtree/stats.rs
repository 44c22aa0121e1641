//! Structural statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Counters of structural events over the lifetime of a tree.
#[derive(Debug, Default)]
pub struct TreeStats {
    /// Nodes allocated, including clones.
    pub nodes_allocated: AtomicU64,
    /// Nodes cloned by the copy-on-write barrier.
    pub clones: AtomicU64,
    /// Node splits below the root.
    pub splits: AtomicU64,
    /// Root splits, each adding one level.
    pub root_splits: AtomicU64,
    /// Node merges.
    pub merges: AtomicU64,
    /// Root collapses, each removing one level.
    pub root_collapses: AtomicU64,
    /// Committed transactions.
    pub commits: AtomicU64,
    /// Rolled back transactions, explicit or on drop.
    pub rollbacks: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $total:ident, $field:ident) => {
        #[doc = concat!("Increments `", stringify!($field), "`.")]
        pub fn $record(&self) {
            self.$field.fetch_add(1, AtomicOrdering::Relaxed);
        }

        #[doc = concat!("Returns `", stringify!($field), "`.")]
        pub fn $total(&self) -> u64 {
            self.$field.load(AtomicOrdering::Relaxed)
        }
    };
}

impl TreeStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_alloc, total_allocated, nodes_allocated);
    counter!(record_clone, total_clones, clones);
    counter!(record_split, total_splits, splits);
    counter!(record_root_split, total_root_splits, root_splits);
    counter!(record_merge, total_merges, merges);
    counter!(record_root_collapse, total_root_collapses, root_collapses);
    counter!(record_commit, total_commits, commits);
    counter!(record_rollback, total_rollbacks, rollbacks);

    /// Returns a plain copy of the counters.
    pub fn snapshot(&self) -> TreeStatsSnapshot {
        TreeStatsSnapshot {
            nodes_allocated: self.total_allocated(),
            clones: self.total_clones(),
            splits: self.total_splits(),
            root_splits: self.total_root_splits(),
            merges: self.total_merges(),
            root_collapses: self.total_root_collapses(),
            commits: self.total_commits(),
            rollbacks: self.total_rollbacks(),
        }
    }
}

/// Point-in-time copy of [`TreeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStatsSnapshot {
    /// Nodes allocated, including clones.
    pub nodes_allocated: u64,
    /// Nodes cloned by the copy-on-write barrier.
    pub clones: u64,
    /// Node splits below the root.
    pub splits: u64,
    /// Root splits.
    pub root_splits: u64,
    /// Node merges.
    pub merges: u64,
    /// Root collapses.
    pub root_collapses: u64,
    /// Committed transactions.
    pub commits: u64,
    /// Rolled back transactions.
    pub rollbacks: u64,
}

impl fmt::Display for TreeStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocated={} clones={} splits={} root_splits={} merges={} root_collapses={} commits={} rollbacks={}",
            self.nodes_allocated,
            self.clones,
            self.splits,
            self.root_splits,
            self.merges,
            self.root_collapses,
            self.commits,
            self.rollbacks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = TreeStats::new();
        stats.record_split();
        stats.record_split();
        stats.record_root_split();
        stats.record_commit();

        assert_eq!(stats.total_splits(), 2);
        assert_eq!(stats.total_root_splits(), 1);
        assert_eq!(stats.total_merges(), 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.splits, 2);
        assert_eq!(snapshot.commits, 1);
        assert!(snapshot.to_string().contains("splits=2"));
    }
}
