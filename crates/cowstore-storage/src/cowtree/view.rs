//! Read operations shared by transactions and snapshots.

use std::fmt::Debug;
use std::ops::{Bound, RangeBounds};

use cowstore_common::types::VersionId;

use super::arena::NodeRef;
use super::cursor::{Cursor, Iter, Range};
use super::diag::{self, NodeSummary, TreeShape};
use super::error::CowTreeResult;
use super::path::{edge_path, find_path, step, Direction};
use super::tree::CowTree;

/// A readable version of a tree.
///
/// Implemented by [`Transaction`](super::Transaction), which reads its own
/// uncommitted state, and by [`Snapshot`](super::Snapshot), which reads one
/// committed version. Every method takes the arena read lock for its own
/// duration and never nests it.
pub trait ReadView {
    /// Key type.
    type Key: Ord + Clone;
    /// Value type.
    type Value: Clone;

    /// Returns the tree this view belongs to.
    fn tree(&self) -> &CowTree<Self::Key, Self::Value>;

    /// Returns the root node of this version.
    fn root(&self) -> NodeRef;

    /// Returns the version this view reads.
    fn version(&self) -> VersionId;

    /// Looks up `key`.
    fn find(&self, key: &Self::Key) -> CowTreeResult<Option<Self::Value>> {
        let arena = self.tree().arena.read();
        let (path, pos) = find_path(&arena, self.root(), key)?;
        let leaf = arena.get(path.leaf()?)?;

        if pos < leaf.len() && leaf.key(pos)? == key {
            return Ok(Some(leaf.value(pos)?.clone()));
        }
        Ok(None)
    }

    /// Returns true if `key` is present.
    fn contains_key(&self, key: &Self::Key) -> CowTreeResult<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Returns the number of entries, read from the root in constant time.
    fn size(&self) -> CowTreeResult<u64> {
        let arena = self.tree().arena.read();
        Ok(arena.get(self.root())?.metadata().size)
    }

    /// Returns true if this version holds no entries.
    fn is_empty(&self) -> CowTreeResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Returns a cursor on the first entry not less than `key`.
    fn locate(&self, key: &Self::Key) -> CowTreeResult<Cursor<'_, Self::Key, Self::Value>> {
        Cursor::seek(self.tree(), self.root(), key)
    }

    /// Returns a cursor on the smallest entry.
    fn begin(&self) -> CowTreeResult<Cursor<'_, Self::Key, Self::Value>> {
        Cursor::first(self.tree(), self.root())
    }

    /// Returns a cursor one past the largest entry.
    fn end(&self) -> CowTreeResult<Cursor<'_, Self::Key, Self::Value>> {
        Cursor::end(self.tree(), self.root())
    }

    /// Returns a cursor on the largest entry.
    fn rbegin(&self) -> CowTreeResult<Cursor<'_, Self::Key, Self::Value>> {
        Cursor::last(self.tree(), self.root())
    }

    /// Returns a cursor one before the smallest entry.
    fn rend(&self) -> CowTreeResult<Cursor<'_, Self::Key, Self::Value>> {
        Cursor::rend(self.tree(), self.root())
    }

    /// Iterates over every entry in key order.
    fn iter(&self) -> CowTreeResult<Iter<'_, Self::Key, Self::Value>> {
        Ok(Iter::new(self.begin()?, Direction::Forward))
    }

    /// Iterates over every entry in reverse key order.
    fn iter_rev(&self) -> CowTreeResult<Iter<'_, Self::Key, Self::Value>> {
        Ok(Iter::new(self.rbegin()?, Direction::Backward))
    }

    /// Iterates over the entries whose keys fall inside `range`.
    fn range<R>(&self, range: R) -> CowTreeResult<Range<'_, Self::Key, Self::Value>>
    where
        R: RangeBounds<Self::Key>,
    {
        let cursor = match range.start_bound() {
            Bound::Included(start) => self.locate(start)?,
            Bound::Excluded(start) => {
                let mut cursor = self.locate(start)?;
                if cursor.is_valid() && cursor.key()? == *start {
                    cursor.advance()?;
                }
                cursor
            }
            Bound::Unbounded => self.begin()?,
        };

        Ok(Range::new(cursor, range.end_bound().cloned()))
    }

    /// Collects the entries inside `range`.
    fn scan<R>(&self, range: R) -> CowTreeResult<Vec<(Self::Key, Self::Value)>>
    where
        R: RangeBounds<Self::Key>,
    {
        self.range(range)?.collect()
    }

    /// Summarizes the leaf that holds `key`, or would hold it.
    fn leaf_summary(&self, key: &Self::Key) -> CowTreeResult<NodeSummary<Self::Key>> {
        let arena = self.tree().arena.read();
        let (path, _) = find_path(&arena, self.root(), key)?;
        diag::summarize(&arena, path.leaf()?)
    }

    /// Summarizes every leaf in key order.
    fn leaves(&self) -> CowTreeResult<Vec<NodeSummary<Self::Key>>> {
        let arena = self.tree().arena.read();
        let mut path = edge_path(&arena, self.root(), Direction::Forward)?;

        let mut leaves = vec![diag::summarize(&arena, path.leaf()?)?];
        while step(&arena, &mut path, 0, Direction::Forward)? {
            leaves.push(diag::summarize(&arena, path.leaf()?)?);
        }
        Ok(leaves)
    }

    /// Checks every structural invariant of this version and returns its
    /// shape.
    fn validate(&self) -> CowTreeResult<TreeShape> {
        let arena = self.tree().arena.read();
        diag::validate(&arena, self.root(), self.version())
    }

    /// Renders this version as an indented outline, one node per line.
    fn dump(&self) -> CowTreeResult<String>
    where
        Self::Key: Debug,
        Self::Value: Debug,
    {
        let arena = self.tree().arena.read();
        diag::dump(&arena, self.root())
    }
}
