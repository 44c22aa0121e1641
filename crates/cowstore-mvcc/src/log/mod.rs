//! Version log of committed roots.
//!
//! Every commit appends the transaction's root to the log; the log entry *is*
//! the committed snapshot. Readers pin an entry by bumping its external
//! reference count, and the collector only tears down entries nobody pins.
//!
//! # Retention Rules
//!
//! An entry is eligible for removal when:
//! 1. It is not the latest entry (new transactions clone the latest root), AND
//! 2. Its external reference count is zero
//!
//! Eligible entries are first *locked* (marked for removal) so that no new
//! reader can pin them, then torn down by the caller, then erased.

use std::collections::VecDeque;
use std::fmt;

use cowstore_common::types::VersionId;
use tracing::trace;

/// One committed version.
#[derive(Clone)]
pub struct LogEntry<R> {
    /// Version id of the committing transaction.
    version: VersionId,
    /// Root node of the committed tree.
    root: R,
    /// Number of live snapshots pinning this entry.
    external_refs: usize,
    /// Set once the entry has been selected for removal.
    locked: bool,
    /// Digest of the nodes created by this version, captured at commit.
    digest: Option<u32>,
}

impl<R: Copy> LogEntry<R> {
    /// Returns the version id.
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Returns the root handle.
    pub fn root(&self) -> R {
        self.root
    }

    /// Returns the number of external references.
    pub fn external_refs(&self) -> usize {
        self.external_refs
    }

    /// Returns true if the entry has been selected for removal.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the digest captured at commit time, if any.
    pub fn digest(&self) -> Option<u32> {
        self.digest
    }
}

impl<R: fmt::Debug> fmt::Debug for LogEntry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEntry")
            .field("version", &self.version)
            .field("root", &self.root)
            .field("external_refs", &self.external_refs)
            .field("locked", &self.locked)
            .finish()
    }
}

/// Ordered sequence of committed versions, oldest first.
///
/// The log is not synchronized; the owner wraps it in a mutex.
#[derive(Debug)]
pub struct VersionLog<R> {
    entries: VecDeque<LogEntry<R>>,
}

impl<R: Copy> VersionLog<R> {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Returns the number of entries in the log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the latest committed entry.
    pub fn latest(&self) -> Option<&LogEntry<R>> {
        self.entries.back()
    }

    /// Iterates over the entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry<R>> {
        self.entries.iter()
    }

    /// Appends a newly committed root.
    ///
    /// Versions are appended in commit order, so the log stays sorted by
    /// version id.
    pub fn append(&mut self, version: VersionId, root: R, digest: Option<u32>) {
        debug_assert!(self.latest().map_or(true, |e| e.version < version));

        self.entries.push_back(LogEntry {
            version,
            root,
            external_refs: 0,
            locked: false,
            digest,
        });

        trace!(version = %version, entries = self.entries.len(), "version appended");
    }

    /// Pins the latest entry and returns its version and root.
    pub fn acquire_latest(&mut self) -> Option<(VersionId, R)> {
        let entry = self.entries.back_mut()?;
        entry.external_refs += 1;
        Some((entry.version, entry.root))
    }

    /// Pins a specific version if it is still in the log and not locked.
    pub fn acquire(&mut self, version: VersionId) -> Option<R> {
        let idx = self.position(version)?;
        let entry = &mut self.entries[idx];

        if entry.locked {
            return None;
        }

        entry.external_refs += 1;
        Some(entry.root)
    }

    /// Releases one pin on a version.
    ///
    /// Returns the remaining reference count, or `None` if the version is
    /// not in the log.
    pub fn release(&mut self, version: VersionId) -> Option<usize> {
        let idx = self.position(version)?;
        let entry = &mut self.entries[idx];
        entry.external_refs = entry.external_refs.saturating_sub(1);
        Some(entry.external_refs)
    }

    /// Returns the external reference count of a version.
    pub fn refs(&self, version: VersionId) -> Option<usize> {
        self.position(version).map(|idx| self.entries[idx].external_refs)
    }

    /// Locks every unreferenced entry except the latest, scanning from the
    /// oldest, and returns the locked versions and their roots.
    pub fn lock_unreferenced(&mut self) -> Vec<(VersionId, R)> {
        let Some(last) = self.entries.len().checked_sub(1) else {
            return Vec::new();
        };

        let mut locked = Vec::new();
        for entry in self.entries.iter_mut().take(last) {
            if entry.external_refs == 0 && !entry.locked {
                entry.locked = true;
                locked.push((entry.version, entry.root));
            }
        }

        locked
    }

    /// Erases the given locked entries and returns how many were removed.
    ///
    /// Only entries that are both listed and locked are erased, so two
    /// cleanup passes never erase each other's entries.
    pub fn remove_locked(&mut self, versions: &[VersionId]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.locked && versions.contains(&e.version)));
        before - self.entries.len()
    }

    fn position(&self, version: VersionId) -> Option<usize> {
        self.entries
            .binary_search_by(|e| e.version.cmp(&version))
            .ok()
    }
}

impl<R: Copy> Default for VersionLog<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: u64) -> VersionId {
        VersionId::new(id)
    }

    #[test]
    fn test_append_and_latest() {
        let mut log: VersionLog<u32> = VersionLog::new();
        assert!(log.is_empty());
        assert!(log.latest().is_none());

        log.append(v(1), 10, None);
        log.append(v(2), 20, Some(0xABCD));

        assert_eq!(log.len(), 2);
        let latest = log.latest().unwrap();
        assert_eq!(latest.version(), v(2));
        assert_eq!(latest.root(), 20);
        assert_eq!(latest.digest(), Some(0xABCD));
    }

    #[test]
    fn test_acquire_release() {
        let mut log: VersionLog<u32> = VersionLog::new();
        assert!(log.acquire_latest().is_none());

        log.append(v(1), 10, None);
        assert_eq!(log.acquire_latest(), Some((v(1), 10)));
        assert_eq!(log.acquire_latest(), Some((v(1), 10)));
        assert_eq!(log.refs(v(1)), Some(2));

        assert_eq!(log.release(v(1)), Some(1));
        assert_eq!(log.release(v(1)), Some(0));
        assert_eq!(log.release(v(1)), Some(0));
        assert_eq!(log.release(v(9)), None);
    }

    #[test]
    fn test_lock_skips_latest_and_pinned() {
        let mut log: VersionLog<u32> = VersionLog::new();
        log.append(v(1), 10, None);
        log.append(v(2), 20, None);
        log.append(v(3), 30, None);
        log.append(v(4), 40, None);

        // Pin version 2.
        assert_eq!(log.acquire(v(2)), Some(20));

        let locked = log.lock_unreferenced();
        assert_eq!(locked, vec![(v(1), 10), (v(3), 30)]);

        // Locked entries can no longer be pinned.
        assert_eq!(log.acquire(v(1)), None);

        let versions: Vec<_> = locked.iter().map(|(version, _)| *version).collect();
        assert_eq!(log.remove_locked(&versions), 2);
        let versions: Vec<_> = log.iter().map(LogEntry::version).collect();
        assert_eq!(versions, vec![v(2), v(4)]);
    }

    #[test]
    fn test_lock_on_single_entry() {
        let mut log: VersionLog<u32> = VersionLog::new();
        assert!(log.lock_unreferenced().is_empty());

        log.append(v(1), 10, None);
        assert!(log.lock_unreferenced().is_empty());
        assert_eq!(log.remove_locked(&[v(1)]), 0);
    }
}
