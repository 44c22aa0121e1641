//! Reclamation of superseded versions.
//!
//! Cleanup is synchronous and proportional to the nodes each discarded
//! version owned alone. It runs when the owner calls
//! [`CowTree::cleanup_snapshots`] and whenever a writer overdraws the node
//! budget.

use cowstore_common::types::VersionId;
use cowstore_mvcc::GcResult;
use tracing::{debug, trace};

use super::arena::{NodeArena, NodeRef};
use super::error::CowTreeResult;
use super::tree::CowTree;

impl<K: Ord + Clone, V: Clone> CowTree<K, V> {
    /// Tears down every committed version no snapshot pins, except the
    /// latest, and returns what was reclaimed.
    pub fn cleanup_snapshots(&self) -> CowTreeResult<GcResult> {
        let locked = self.log.lock().lock_unreferenced();
        if locked.is_empty() {
            self.gc_stats.record_run(&GcResult::default(), false);
            return Ok(GcResult::default());
        }

        let mut arena = self.arena.write();
        self.remove_locked(&mut arena, locked, false)
    }

    /// Cleanup pass run by a writer that already holds the arena.
    pub(crate) fn collect_for_budget(&self, arena: &mut NodeArena<K, V>) -> CowTreeResult<GcResult> {
        let locked = self.log.lock().lock_unreferenced();
        self.remove_locked(arena, locked, true)
    }

    /// Discards one version's root ownership and frees every node that
    /// becomes unreachable. Returns the number of nodes freed.
    pub(crate) fn remove_snapshot(
        &self,
        arena: &mut NodeArena<K, V>,
        root: NodeRef,
    ) -> CowTreeResult<usize> {
        arena.release(root)
    }

    fn remove_locked(
        &self,
        arena: &mut NodeArena<K, V>,
        locked: Vec<(VersionId, NodeRef)>,
        from_budget: bool,
    ) -> CowTreeResult<GcResult> {
        let mut result = GcResult::default();
        let mut versions = Vec::with_capacity(locked.len());

        for (version, root) in locked {
            let freed = self.remove_snapshot(arena, root)?;
            trace!(version = %version, nodes_freed = freed, "snapshot removed");

            result.nodes_freed += freed;
            versions.push(version);
        }

        result.snapshots_removed = self.log.lock().remove_locked(&versions);
        self.gc_stats.record_run(&result, from_budget);

        debug!(
            snapshots_removed = result.snapshots_removed,
            nodes_freed = result.nodes_freed,
            live_nodes = arena.live(),
            from_budget,
            "snapshot cleanup finished"
        );
        Ok(result)
    }
}
