//! Transaction and snapshot handles.
//!
//! A [`Transaction`] holds the tree's writer slot from creation until
//! `commit` or `rollback` consumes it. Dropping an unfinished transaction
//! rolls it back. A [`Snapshot`] pins one committed version in the log until
//! it is dropped.

use cowstore_common::types::VersionId;
use parking_lot::MutexGuard;
use tracing::{error, warn};

use super::arena::NodeRef;
use super::error::CowTreeResult;
use super::mutate::Writer;
use super::tree::{CowTree, WriterState};
use super::view::ReadView;

/// The single mutable view of a tree.
///
/// All writes go through a transaction. Reads through it observe its own
/// uncommitted writes; snapshots never do.
pub struct Transaction<'t, K: Ord + Clone, V: Clone> {
    tree: &'t CowTree<K, V>,
    _writer: MutexGuard<'t, WriterState>,
    version: VersionId,
    root: NodeRef,
    finished: bool,
}

impl<'t, K: Ord + Clone, V: Clone> Transaction<'t, K, V> {
    pub(crate) fn new(
        tree: &'t CowTree<K, V>,
        writer: MutexGuard<'t, WriterState>,
        version: VersionId,
        root: NodeRef,
    ) -> Self {
        Self {
            tree,
            _writer: writer,
            version,
            root,
            finished: false,
        }
    }

    /// Inserts or overwrites `key` and returns the previous value.
    pub fn assign(&mut self, key: K, value: V) -> CowTreeResult<Option<V>> {
        self.write(|writer| writer.assign(key, value))
    }

    /// Removes `key`. Returns false if it was not present.
    pub fn remove(&mut self, key: &K) -> CowTreeResult<bool> {
        self.write(|writer| writer.remove(key).map(|removed| removed.is_some()))
    }

    /// Removes `key` and returns its value.
    pub fn take(&mut self, key: &K) -> CowTreeResult<Option<V>> {
        self.write(|writer| writer.remove(key))
    }

    /// Publishes this transaction's root as the latest snapshot and returns
    /// its version.
    ///
    /// On error nothing is published and the transaction rolls back when
    /// dropped.
    pub fn commit(mut self) -> CowTreeResult<VersionId> {
        self.tree.commit_txn(self.version, self.root)?;
        self.finished = true;
        Ok(self.version)
    }

    /// Discards every node private to this transaction and returns how many
    /// were freed.
    pub fn rollback(mut self) -> CowTreeResult<usize> {
        self.finished = true;
        self.tree.rollback_txn(self.version, self.root)
    }

    fn write<R>(
        &mut self,
        op: impl FnOnce(&mut Writer<'_, K, V>) -> CowTreeResult<R>,
    ) -> CowTreeResult<R> {
        let mut arena = self.tree.arena.write();
        let mut writer = Writer::new(self.tree, &mut arena, self.version, Some(self.root));
        let result = op(&mut writer);

        if let Some(root) = writer.current_root() {
            self.root = root;
        }
        result
    }
}

impl<K: Ord + Clone, V: Clone> ReadView for Transaction<'_, K, V> {
    type Key = K;
    type Value = V;

    fn tree(&self) -> &CowTree<K, V> {
        self.tree
    }

    fn root(&self) -> NodeRef {
        self.root
    }

    fn version(&self) -> VersionId {
        self.version
    }
}

impl<K: Ord + Clone, V: Clone> Drop for Transaction<'_, K, V> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        warn!(version = %self.version, "transaction dropped without commit, rolling back");
        if let Err(e) = self.tree.rollback_txn(self.version, self.root) {
            error!(version = %self.version, error = %e, "implicit rollback failed");
        }
    }
}

impl<K: Ord + Clone, V: Clone> std::fmt::Debug for Transaction<'_, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("version", &self.version)
            .field("root", &self.root)
            .finish()
    }
}

/// A read-only view of one committed version.
pub struct Snapshot<'t, K: Ord + Clone, V: Clone> {
    tree: &'t CowTree<K, V>,
    version: VersionId,
    root: NodeRef,
}

impl<'t, K: Ord + Clone, V: Clone> Snapshot<'t, K, V> {
    pub(crate) fn new(tree: &'t CowTree<K, V>, version: VersionId, root: NodeRef) -> Self {
        Self {
            tree,
            version,
            root,
        }
    }
}

impl<K: Ord + Clone, V: Clone> ReadView for Snapshot<'_, K, V> {
    type Key = K;
    type Value = V;

    fn tree(&self) -> &CowTree<K, V> {
        self.tree
    }

    fn root(&self) -> NodeRef {
        self.root
    }

    fn version(&self) -> VersionId {
        self.version
    }
}

impl<K: Ord + Clone, V: Clone> Drop for Snapshot<'_, K, V> {
    fn drop(&mut self) {
        self.tree.release_snapshot(self.version);
    }
}

impl<K: Ord + Clone, V: Clone> std::fmt::Debug for Snapshot<'_, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .field("root", &self.root)
            .finish()
    }
}
