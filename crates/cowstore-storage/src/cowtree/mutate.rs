//! Copy-on-write mutation algorithms.
//!
//! Every write follows the same shape: descend to the target leaf, make the
//! whole path private to the transaction (`update_path`), then mutate and
//! repair the structure bottom-up.
//!
//! # Ownership
//!
//! A node may only be changed by the transaction whose version created it.
//! Anything older is cloned first: the clone takes over the parent slot and
//! the displaced node loses one owner. Nodes still reachable from a committed
//! version keep their remaining owners and are left untouched.
//!
//! # Rebalancing
//!
//! - A full leaf is split at its midpoint before inserting; a full parent is
//!   split first, recursively, and splitting the root adds a level
//! - A leaf at half occupancy or below is merged with its next sibling, or
//!   failing that its previous one, when both fit into one node and their
//!   ancestors up to the common one fit as well
//! - A root left with a single child is replaced by that child

use std::mem;

use cowstore_common::types::VersionId;
use tracing::{debug, trace};

use super::arena::{NodeArena, NodeRef};
use super::error::{CowTreeError, CowTreeResult};
use super::node::Node;
use super::path::{find_path, step, Direction, Path};
use super::tree::CowTree;

/// Write context of one transaction for the duration of one operation.
pub(crate) struct Writer<'a, K, V> {
    tree: &'a CowTree<K, V>,
    arena: &'a mut NodeArena<K, V>,
    version: VersionId,
    root: Option<NodeRef>,
}

impl<'a, K: Ord + Clone, V: Clone> Writer<'a, K, V> {
    pub(crate) fn new(
        tree: &'a CowTree<K, V>,
        arena: &'a mut NodeArena<K, V>,
        version: VersionId,
        root: Option<NodeRef>,
    ) -> Self {
        Self {
            tree,
            arena,
            version,
            root,
        }
    }

    /// Returns the transaction root after the operation.
    pub(crate) fn current_root(&self) -> Option<NodeRef> {
        self.root
    }

    fn root(&self) -> CowTreeResult<NodeRef> {
        self.root
            .ok_or_else(|| CowTreeError::structure("transaction has no root"))
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Makes room for `count` new nodes, collecting unreferenced snapshots
    /// first if the budget would be overdrawn.
    pub(crate) fn ensure_node_budget(&mut self, count: usize) -> CowTreeResult<()> {
        if self.arena.budget().would_exceed(count) {
            debug!(
                remaining = self.arena.budget().remaining(),
                requested = count,
                "node budget exhausted, collecting snapshots"
            );
            self.tree.collect_for_budget(self.arena)?;
        }

        self.arena.budget_mut().charge(count);
        Ok(())
    }

    fn alloc(&mut self, mut node: Node<K, V>) -> NodeRef {
        node.refs = 1;
        self.tree.stats.record_alloc();
        self.arena.alloc(node)
    }

    /// Creates the single empty leaf of a first transaction.
    pub(crate) fn create_root_leaf(&mut self) -> CowTreeResult<NodeRef> {
        self.ensure_node_budget(1)?;
        let id = self.arena.next_node_id();
        let leaf = Node::new_leaf(id, self.version, self.tree.layout);
        let root = self.alloc(leaf);

        self.root = Some(root);
        Ok(root)
    }

    /// Clones the latest committed root for a new transaction.
    pub(crate) fn clone_root(&mut self, latest: NodeRef) -> CowTreeResult<NodeRef> {
        let root = self.clone_node(latest)?;
        self.root = Some(root);
        Ok(root)
    }

    /// Copies `node` under the transaction's version with one owner. The
    /// children of a branch gain the copy as an extra owner.
    fn clone_node(&mut self, node: NodeRef) -> CowTreeResult<NodeRef> {
        self.ensure_node_budget(1)?;

        let id = self.arena.next_node_id();
        let copy = self.arena.get(node)?.clone_as(id, self.version);
        let clone = self.alloc(copy);
        self.arena.ref_children(clone)?;

        self.tree.stats.record_clone();
        trace!(from = %node, to = %clone, version = %self.version, "node cloned");
        Ok(clone)
    }

    /// Returns the node for mutation if this transaction owns it.
    fn owned_mut(&mut self, node: NodeRef) -> CowTreeResult<&mut Node<K, V>> {
        let version = self.version;
        let entry = self.arena.get_mut(node)?;

        if entry.version() != version {
            return Err(CowTreeError::stale_write(node, entry.version(), version));
        }
        Ok(entry)
    }

    fn child_pos(&self, parent: NodeRef, child: NodeRef) -> CowTreeResult<usize> {
        self.arena
            .get(parent)?
            .find_child_node(child)
            .ok_or_else(|| {
                CowTreeError::structure(format!("node {child} is not a child of {parent}"))
            })
    }

    /// Drops one owner of a node displaced from this transaction's tree.
    fn discard(&mut self, node: NodeRef) -> CowTreeResult<()> {
        let freed = self.arena.release(node)?;
        if freed > 0 {
            self.tree.gc_stats.record_freed(freed);
        }
        Ok(())
    }

    // =========================================================================
    // Copy-on-write barrier
    // =========================================================================

    /// Makes every node on `path` private to this transaction.
    ///
    /// Walks from the root down; the first node from an older version and
    /// everything below it is cloned into its already private parent.
    pub(crate) fn update_path(&mut self, path: &mut Path) -> CowTreeResult<()> {
        let root_level = path.root_level();
        let root = path.get(root_level)?;
        self.owned_mut(root)?;

        for level in (0..root_level).rev() {
            let node = path.get(level)?;
            if self.arena.get(node)?.version() == self.version {
                continue;
            }

            let parent = path.get(level + 1)?;
            let pos = self.child_pos(parent, node)?;
            let clone = self.own_child(parent, pos, node)?;
            path.set(level, clone)?;
        }

        Ok(())
    }

    /// Replaces the older `child` in slot `pos` of the private `parent` with
    /// a private clone.
    fn own_child(&mut self, parent: NodeRef, pos: usize, child: NodeRef) -> CowTreeResult<NodeRef> {
        if self.arena.get(child)?.version() == self.version {
            return Ok(child);
        }

        let clone = self.clone_node(child)?;
        self.owned_mut(parent)?.set_child(pos, clone)?;
        self.discard(child)?;
        Ok(clone)
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts or overwrites `key`, returning the previous value.
    pub(crate) fn assign(&mut self, key: K, value: V) -> CowTreeResult<Option<V>> {
        let (mut path, pos) = find_path(self.arena, self.root()?, &key)?;

        let leaf = self.arena.get(path.leaf()?)?;
        if pos < leaf.len() && *leaf.key(pos)? == key {
            self.update_path(&mut path)?;
            let previous = self.owned_mut(path.leaf()?)?.replace_value(pos, value)?;
            return Ok(Some(previous));
        }

        self.insert_to(path, pos, key, value)?;
        Ok(None)
    }

    fn insert_to(&mut self, mut path: Path, mut pos: usize, key: K, value: V) -> CowTreeResult<()> {
        self.update_path(&mut path)?;

        if !self.arena.get(path.leaf()?)?.has_space(1) {
            self.split_path(&mut path, 0)?;
            (path, pos) = find_path(self.arena, self.root()?, &key)?;
        }

        self.owned_mut(path.leaf()?)?.insert_value(pos, key, value)?;
        self.update_keys_up(&path, pos, 0)?;

        let root = self.root()?;
        self.owned_mut(root)?.metadata_mut().size += 1;
        Ok(())
    }

    /// Splits the node at `level` in half, making room in its parent first.
    ///
    /// On return the path points at whichever half holds the path's node
    /// one level below.
    fn split_path(&mut self, path: &mut Path, level: usize) -> CowTreeResult<()> {
        let node = path.get(level)?;

        if let Some(parent) = path.parent(level) {
            if !self.arena.get(parent)?.has_space(1) {
                self.split_path(path, level + 1)?;
            }
        }

        self.ensure_node_budget(1)?;
        let id = self.arena.next_node_id();
        let owned = self.owned_mut(node)?;
        let at = owned.len() / 2;
        let sibling = owned.split_off(at, id)?;

        let left_max = owned
            .max_key()
            .cloned()
            .ok_or_else(|| CowTreeError::structure("split left an empty node"))?;
        let right_max = sibling
            .max_key()
            .cloned()
            .ok_or_else(|| CowTreeError::structure("split produced an empty sibling"))?;
        let sibling = self.alloc(sibling);

        match path.parent(level) {
            Some(parent) => {
                let pos = self.child_pos(parent, node)?;
                let parent_node = self.owned_mut(parent)?;
                parent_node.set_key(pos, left_max)?;
                parent_node.insert_child(pos + 1, right_max, sibling)?;

                self.tree.stats.record_split();
                trace!(node = %node, sibling = %sibling, level, "node split");
            }
            None => {
                self.ensure_node_budget(1)?;
                let id = self.arena.next_node_id();
                let mut new_root = Node::new_branch(id, self.version, self.tree.layout);
                new_root.insert_child(0, left_max, node)?;
                new_root.insert_child(1, right_max, sibling)?;
                *new_root.metadata_mut() = mem::take(self.owned_mut(node)?.metadata_mut());

                // The old root's single owner becomes the new root's slot.
                let new_root = self.alloc(new_root);
                path.push_root(new_root);
                self.root = Some(new_root);

                self.tree.stats.record_root_split();
                debug!(root = %new_root, height = path.len(), "root split");
            }
        }

        if level > 0 {
            let below = path.get(level - 1)?;
            if self.arena.get(node)?.find_child_node(below).is_none() {
                path.set(level, sibling)?;
            }
        }

        Ok(())
    }

    /// Refreshes parent keys after the entry at `pos` of the node at `level`
    /// changed, for as long as the changed entry is the node's maximum.
    fn update_keys_up(&mut self, path: &Path, mut pos: usize, mut level: usize) -> CowTreeResult<()> {
        while let Some(parent) = path.parent(level) {
            let node = path.get(level)?;
            let current = self.arena.get(node)?;
            if pos + 1 < current.len() {
                break;
            }
            let Some(max) = current.max_key().cloned() else {
                break;
            };

            let parent_pos = self.child_pos(parent, node)?;
            self.owned_mut(parent)?.set_key(parent_pos, max)?;

            pos = parent_pos;
            level += 1;
        }

        Ok(())
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Removes `key` and returns its value.
    pub(crate) fn remove(&mut self, key: &K) -> CowTreeResult<Option<V>> {
        let (mut path, pos) = find_path(self.arena, self.root()?, key)?;

        let leaf = self.arena.get(path.leaf()?)?;
        if pos >= leaf.len() || leaf.key(pos)? != key {
            return Ok(None);
        }

        self.update_path(&mut path)?;
        let (_, value) = self.owned_mut(path.leaf()?)?.remove_value(pos)?;
        self.update_keys_up(&path, pos, 0)?;

        let root = self.root()?;
        let metadata = self.owned_mut(root)?.metadata_mut();
        metadata.size = metadata.size.saturating_sub(1);

        if !path.is_root(0) && self.arena.get(path.leaf()?)?.should_merge() {
            self.rebalance_leaf(&mut path)?;
        }

        Ok(Some(value))
    }

    /// Merges an underfull leaf with a neighbour, preferring the next one.
    fn rebalance_leaf(&mut self, path: &mut Path) -> CowTreeResult<()> {
        let mut next = path.clone();
        if step(self.arena, &mut next, 0, Direction::Forward)?
            && self.can_merge_paths(path, &next, 0)?
        {
            self.update_path(&mut next)?;
            return self.merge_paths(path, &mut next, 0);
        }

        let mut prev = path.clone();
        if step(self.arena, &mut prev, 0, Direction::Backward)?
            && self.can_merge_paths(&prev, path, 0)?
        {
            self.update_path(&mut prev)?;
            self.merge_paths(&mut prev, path, 0)?;
            *path = prev;
            return Ok(());
        }

        if self.arena.get(path.leaf()?)?.is_empty() {
            self.unlink_empty(path, 0)?;
        }

        Ok(())
    }

    /// Returns true if the nodes at `level` of two adjacent paths fit into
    /// one node, and so do their distinct ancestors below the common one.
    fn can_merge_paths(&self, left: &Path, right: &Path, level: usize) -> CowTreeResult<bool> {
        let mut level = level;

        loop {
            let left_node = left.get(level)?;
            let right_node = right.get(level)?;
            if !self
                .arena
                .get(left_node)?
                .can_merge_with(self.arena.get(right_node)?)
            {
                return Ok(false);
            }

            let (Some(left_parent), Some(right_parent)) = (left.parent(level), right.parent(level))
            else {
                return Ok(false);
            };

            if left_parent == right_parent {
                let parent = self.arena.get(left_parent)?;
                return Ok(matches!(
                    (parent.find_child_node(left_node), parent.find_child_node(right_node)),
                    (Some(l), Some(r)) if l + 1 == r
                ));
            }

            level += 1;
        }
    }

    /// Moves the entries of `right[level]` into `left[level]`, merging their
    /// distinct ancestors first so both end up under one parent.
    fn merge_paths(&mut self, left: &mut Path, right: &mut Path, level: usize) -> CowTreeResult<()> {
        let parent = left
            .parent(level)
            .ok_or_else(|| CowTreeError::structure("cannot merge the root"))?;
        if right.parent(level) != Some(parent) {
            self.merge_paths(left, right, level + 1)?;
        }

        let parent = left.get(level + 1)?;
        let node = left.get(level)?;
        let victim = right.get(level)?;

        let pos = self.child_pos(parent, node)?;
        if self.arena.get(parent)?.child(pos + 1)? != victim {
            return Err(CowTreeError::structure(format!(
                "merge of non-adjacent nodes {node} and {victim}"
            )));
        }

        let victim_refs = self.owned_mut(victim)?.refs();
        if victim_refs != 1 {
            return Err(CowTreeError::structure(format!(
                "private node {victim} has {victim_refs} owners"
            )));
        }

        // The victim's children keep their owner count; the slot moves.
        self.owned_mut(parent)?.remove_child(pos + 1)?;
        let removed = self.arena.free(victim)?;
        let merged = self.owned_mut(node)?;
        merged.append(removed)?;
        let max = merged.max_key().cloned();

        if let Some(max) = max {
            self.owned_mut(parent)?.set_key(pos, max)?;
        }
        self.update_keys_up(left, pos, level + 1)?;

        self.tree.stats.record_merge();
        self.tree.gc_stats.record_freed(1);
        trace!(node = %node, victim = %victim, level, "nodes merged");

        if left.is_root(level + 1) && self.arena.get(parent)?.len() == 1 {
            self.collapse_root()?;
            left.pop_root();
            right.pop_root();
        }

        right.set(level, node)?;
        Ok(())
    }

    /// Detaches an empty node that could not be merged, together with any
    /// ancestor that becomes empty, then collapses single-child roots.
    fn unlink_empty(&mut self, path: &Path, level: usize) -> CowTreeResult<()> {
        let mut level = level;

        loop {
            let node = path.get(level)?;
            let parent = path
                .parent(level)
                .ok_or_else(|| CowTreeError::structure("cannot unlink the root"))?;

            let pos = self.child_pos(parent, node)?;
            let parent_node = self.owned_mut(parent)?;
            parent_node.remove_child(pos)?;
            let remaining = parent_node.len();
            self.discard(node)?;

            trace!(node = %node, level, "empty node unlinked");

            if remaining == 0 && !path.is_root(level + 1) {
                level += 1;
                continue;
            }
            if remaining > 0 && pos == remaining {
                self.update_keys_up(path, remaining - 1, level + 1)?;
            }
            break;
        }

        loop {
            let root = self.arena.get(self.root()?)?;
            if root.is_leaf() || root.len() != 1 {
                break;
            }
            self.collapse_root()?;
        }

        Ok(())
    }

    /// Replaces a single-child root by its child.
    fn collapse_root(&mut self) -> CowTreeResult<()> {
        let old_root = self.root()?;
        let child = self.arena.get(old_root)?.first_child()?;
        let child = self.own_child(old_root, 0, child)?;

        let metadata = self.owned_mut(old_root)?.metadata();
        *self.owned_mut(child)?.metadata_mut() = metadata;

        // The child's single owner, the old root's slot, becomes the root
        // ownership.
        self.arena.free(old_root)?;
        self.root = Some(child);

        self.tree.stats.record_root_collapse();
        self.tree.gc_stats.record_freed(1);
        debug!(old_root = %old_root, root = %child, "root collapsed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cowtree::view::ReadView;
    use cowstore_common::config::TreeConfig;

    fn small_tree() -> CowTree<u32, u32> {
        CowTree::with_config(TreeConfig::for_testing()).unwrap()
    }

    #[test]
    fn test_update_path_clones_shared_nodes() {
        let tree = small_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..20 {
            txn.assign(i, i).unwrap();
        }
        txn.commit().unwrap();
        let committed_root = tree.snapshot().unwrap().root();

        let txn = tree.transaction().unwrap();
        let version = txn.version();
        let root = txn.root();
        assert_ne!(root, committed_root);

        let mut arena = tree.arena.write();
        let (mut path, _) = find_path(&arena, root, &3).unwrap();
        let shared_leaf = path.leaf().unwrap();
        assert_ne!(arena.get(shared_leaf).unwrap().version(), version);
        assert_eq!(arena.get(shared_leaf).unwrap().refs(), 2);

        let mut writer = Writer::new(&tree, &mut arena, version, Some(root));
        writer.update_path(&mut path).unwrap();
        drop(writer);

        let private_leaf = path.leaf().unwrap();
        assert_ne!(private_leaf, shared_leaf);
        assert_eq!(arena.get(private_leaf).unwrap().version(), version);
        assert_eq!(arena.get(private_leaf).unwrap().refs(), 1);
        // The committed version still owns the original leaf.
        assert_eq!(arena.get(shared_leaf).unwrap().refs(), 1);
        assert_eq!(
            arena.get(private_leaf).unwrap().keys(),
            arena.get(shared_leaf).unwrap().keys()
        );
    }

    #[test]
    fn test_stale_node_write_rejected() {
        let tree = small_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..20 {
            txn.assign(i, i).unwrap();
        }
        txn.commit().unwrap();

        let txn = tree.transaction().unwrap();
        let version = txn.version();
        let root = txn.root();

        let mut arena = tree.arena.write();
        let (path, pos) = find_path(&arena, root, &3).unwrap();
        let shared_leaf = path.leaf().unwrap();

        // Skipping the copy-on-write barrier must not mutate a committed node.
        let mut writer = Writer::new(&tree, &mut arena, version, Some(root));
        let err = writer.owned_mut(shared_leaf).unwrap_err();
        assert!(matches!(
            err,
            CowTreeError::StaleNodeWrite { node, txn_version, .. }
                if node == shared_leaf && txn_version == version
        ));
        assert!(!err.is_retryable());
        drop(writer);

        assert_eq!(arena.get(shared_leaf).unwrap().value(pos).unwrap(), &3);
    }

    #[test]
    fn test_split_grows_height() {
        let tree = small_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..9 {
            txn.assign(i, i).unwrap();
        }

        let shape = txn.validate().unwrap();
        assert_eq!(shape.height, 2);
        assert_eq!(shape.leaf_count, 2);
        assert_eq!(tree.stats().total_root_splits(), 1);
    }

    #[test]
    fn test_descending_inserts() {
        let tree = small_tree();
        let mut txn = tree.transaction().unwrap();
        for i in (0..200).rev() {
            txn.assign(i, i * 2).unwrap();
            txn.validate().unwrap();
        }

        assert_eq!(txn.size().unwrap(), 200);
        for i in 0..200 {
            assert_eq!(txn.find(&i).unwrap(), Some(i * 2));
        }
    }

    #[test]
    fn test_remove_merges_and_collapses() {
        let tree = small_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..100 {
            txn.assign(i, i).unwrap();
        }
        assert!(txn.validate().unwrap().height >= 3);

        for i in 0..100 {
            assert!(txn.remove(&i).unwrap());
            txn.validate().unwrap();
        }

        let shape = txn.validate().unwrap();
        assert_eq!(shape.height, 1);
        assert_eq!(txn.size().unwrap(), 0);
        assert!(tree.stats().total_merges() > 0);
        assert!(tree.stats().total_root_collapses() > 0);
    }

    #[test]
    fn test_interleaved_removal_across_versions() {
        let tree = small_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..64 {
            txn.assign(i, i).unwrap();
        }
        txn.commit().unwrap();

        let before = tree.snapshot().unwrap();

        let mut txn = tree.transaction().unwrap();
        for i in (0..64).step_by(2) {
            assert!(txn.remove(&i).unwrap());
            txn.validate().unwrap();
        }
        txn.commit().unwrap();

        let after = tree.snapshot().unwrap();
        for i in 0..64 {
            assert_eq!(before.find(&i).unwrap(), Some(i));
            let expected = if i % 2 == 0 { None } else { Some(i) };
            assert_eq!(after.find(&i).unwrap(), expected);
        }
        before.validate().unwrap();
        after.validate().unwrap();
    }

    #[test]
    fn test_random_workload_against_btreemap() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use std::collections::BTreeMap;

        let tree: CowTree<u32, u32> =
            CowTree::with_config(TreeConfig::for_testing().with_node_budget(10_000)).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut oracle = BTreeMap::new();

        for _ in 0..6 {
            let mut txn = tree.transaction().unwrap();
            for _ in 0..300 {
                let key = rng.gen_range(0..150);
                if rng.gen_bool(0.55) {
                    let value = rng.gen();
                    assert_eq!(txn.assign(key, value).unwrap(), oracle.insert(key, value));
                } else {
                    assert_eq!(txn.take(&key).unwrap(), oracle.remove(&key));
                }
            }
            txn.validate().unwrap();
            txn.commit().unwrap();
        }

        let snapshot = tree.snapshot().unwrap();
        assert_eq!(snapshot.size().unwrap(), oracle.len() as u64);
        for (key, value) in &oracle {
            assert_eq!(snapshot.find(key).unwrap().as_ref(), Some(value));
        }
    }

    #[test]
    fn test_budget_triggers_cleanup() {
        let config = TreeConfig::for_testing().with_node_budget(4);
        let tree: CowTree<u32, u32> = CowTree::with_config(config).unwrap();

        for round in 0..10 {
            let mut txn = tree.transaction().unwrap();
            for i in 0..16 {
                txn.assign(i, round).unwrap();
            }
            txn.commit().unwrap();
        }

        assert!(tree.gc_stats().total_budget_runs() > 0);
        assert!(tree.gc_stats().total_snapshots_removed() > 0);
        assert!(tree.versions().len() < 10);

        let snapshot = tree.snapshot().unwrap();
        for i in 0..16 {
            assert_eq!(snapshot.find(&i).unwrap(), Some(9));
        }
    }
}
