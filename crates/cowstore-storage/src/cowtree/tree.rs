//! The tree engine: version counters, the writer slot, the version log and
//! the node arena of one copy-on-write tree.

use cowstore_common::config::TreeConfig;
use cowstore_common::types::VersionId;
use cowstore_mvcc::{GcStats, LogEntry, VersionLog};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::arena::{NodeArena, NodeRef};
use super::error::{CowTreeError, CowTreeResult};
use super::mutate::Writer;
use super::node::NodeLayout;
use super::stats::TreeStats;
use super::txn::{Snapshot, Transaction};

/// Computes the digest of the nodes a version created.
pub(crate) type DigestFn<K, V> = fn(&NodeArena<K, V>, NodeRef, VersionId) -> CowTreeResult<u32>;

/// State owned by the single writer.
#[derive(Debug)]
pub(crate) struct WriterState {
    next_version: VersionId,
}

/// In-memory copy-on-write multi-version B+Tree.
///
/// One [`Transaction`] at a time mutates a private copy of the paths it
/// touches; any number of [`Snapshot`]s read committed versions concurrently
/// with it and with each other.
///
/// # Synchronization
///
/// - `writer` is held by the outstanding transaction for its whole lifetime
/// - `arena` is read-locked per read step and write-locked per mutation
/// - `log` is locked briefly; it is never held while acquiring `arena`
///
/// # Example
///
/// ```rust
/// use cowstore_storage::cowtree::{CowTree, ReadView};
///
/// let tree: CowTree<u32, String> = CowTree::new();
///
/// let mut txn = tree.transaction().unwrap();
/// txn.assign(1, "one".to_string()).unwrap();
/// txn.commit().unwrap();
///
/// let snapshot = tree.snapshot().unwrap();
/// assert_eq!(snapshot.find(&1).unwrap(), Some("one".to_string()));
/// ```
pub struct CowTree<K, V> {
    config: TreeConfig,
    pub(crate) layout: NodeLayout,
    pub(crate) arena: RwLock<NodeArena<K, V>>,
    pub(crate) log: Mutex<VersionLog<NodeRef>>,
    writer: Mutex<WriterState>,
    pub(crate) stats: TreeStats,
    pub(crate) gc_stats: GcStats,
    pub(crate) digest: Option<DigestFn<K, V>>,
}

impl<K: Ord + Clone, V: Clone> CowTree<K, V> {
    /// Creates an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::build(TreeConfig::default())
    }

    /// Creates an empty tree with the given configuration.
    pub fn with_config(config: TreeConfig) -> CowTreeResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TreeConfig) -> Self {
        Self {
            layout: NodeLayout::new(config.node_size, config.node_index_size),
            arena: RwLock::new(NodeArena::new(config.node_budget)),
            log: Mutex::new(VersionLog::new()),
            writer: Mutex::new(WriterState {
                next_version: VersionId::FIRST,
            }),
            stats: TreeStats::new(),
            gc_stats: GcStats::new(),
            digest: None,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Returns the structural counters.
    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    /// Returns the reclamation counters.
    pub fn gc_stats(&self) -> &GcStats {
        &self.gc_stats
    }

    /// Returns the number of live nodes across all versions.
    pub fn node_count(&self) -> usize {
        self.arena.read().live()
    }

    /// Returns the committed versions still in the log, oldest first.
    pub fn versions(&self) -> Vec<VersionId> {
        self.log.lock().iter().map(LogEntry::version).collect()
    }

    /// Returns the latest committed version.
    pub fn latest_version(&self) -> Option<VersionId> {
        self.log.lock().latest().map(LogEntry::version)
    }

    /// Returns true while a transaction is outstanding.
    pub fn has_active_transaction(&self) -> bool {
        self.writer.is_locked()
    }

    /// Starts the single writable transaction.
    ///
    /// The new transaction works on a shallow clone of the latest committed
    /// root, or on a fresh empty leaf if nothing has been committed yet.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyActiveTransaction` if another transaction is still
    /// outstanding.
    pub fn transaction(&self) -> CowTreeResult<Transaction<'_, K, V>> {
        let mut writer = self
            .writer
            .try_lock()
            .ok_or(CowTreeError::AlreadyActiveTransaction)?;

        let version = writer.next_version;
        writer.next_version = version.next();

        let latest = self.log.lock().latest().map(LogEntry::root);

        let root = {
            let mut arena = self.arena.write();
            let mut ctx = Writer::new(self, &mut arena, version, None);
            match latest {
                Some(latest) => ctx.clone_root(latest)?,
                None => ctx.create_root_leaf()?,
            }
        };

        debug!(version = %version, from_latest = latest.is_some(), "transaction started");
        Ok(Transaction::new(self, writer, version, root))
    }

    /// Pins the latest committed version.
    ///
    /// Returns `None` before the first commit.
    pub fn snapshot(&self) -> Option<Snapshot<'_, K, V>> {
        let (version, root) = self.log.lock().acquire_latest()?;
        Some(Snapshot::new(self, version, root))
    }

    /// Pins a specific committed version if it is still in the log.
    pub fn snapshot_at(&self, version: VersionId) -> Option<Snapshot<'_, K, V>> {
        let root = self.log.lock().acquire(version)?;
        Some(Snapshot::new(self, version, root))
    }

    /// Appends a transaction's root to the log, making it the latest
    /// snapshot.
    pub(crate) fn commit_txn(&self, version: VersionId, root: NodeRef) -> CowTreeResult<()> {
        let digest = match self.digest {
            Some(digest_fn) => {
                let arena = self.arena.read();
                Some(digest_fn(&arena, root, version)?)
            }
            None => None,
        };

        self.log.lock().append(version, root, digest);
        self.stats.record_commit();

        debug!(version = %version, "transaction committed");
        Ok(())
    }

    /// Tears down every node private to an aborted transaction.
    pub(crate) fn rollback_txn(&self, version: VersionId, root: NodeRef) -> CowTreeResult<usize> {
        let freed = {
            let mut arena = self.arena.write();
            self.remove_snapshot(&mut arena, root)?
        };

        self.gc_stats.record_freed(freed);
        self.stats.record_rollback();

        debug!(version = %version, nodes_freed = freed, "transaction rolled back");
        Ok(freed)
    }

    /// Drops one pin on a committed version.
    pub(crate) fn release_snapshot(&self, version: VersionId) {
        self.log.lock().release(version);
    }
}

impl<K: Ord + Clone, V: Clone> Default for CowTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for CowTree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CowTree")
            .field("config", &self.config)
            .field("live_nodes", &self.arena.read().live())
            .field("versions", &self.log.lock().len())
            .field("writing", &self.writer.is_locked())
            .finish()
    }
}
