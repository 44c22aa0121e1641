//! Ordered traversal of one tree version.
//!
//! A cursor is a path plus a position in its leaf. Positions run from
//! "before begin" through every entry to "end", which sits one past the last
//! entry of the last leaf. A cursor never rests past the end of a leaf that
//! has a successor, so `is_end` needs no lookahead.
//!
//! Every cursor step takes the arena read lock for the duration of that step
//! only. The version it walks is pinned by the view it was created from.

use std::ops::Bound;

use super::arena::{NodeArena, NodeRef};
use super::error::{CowTreeError, CowTreeResult};
use super::path::{edge_path, find_path, step, Direction, Path};
use super::tree::CowTree;

/// Position in one tree version.
pub struct Cursor<'v, K, V> {
    tree: &'v CowTree<K, V>,
    path: Path,
    pos: usize,
    len: usize,
    before_begin: bool,
}

impl<'v, K: Ord + Clone, V: Clone> Cursor<'v, K, V> {
    /// Positions on the first entry not less than `key`.
    pub(crate) fn seek(
        tree: &'v CowTree<K, V>,
        root: NodeRef,
        key: &K,
    ) -> CowTreeResult<Self> {
        let arena = tree.arena.read();
        let (path, pos) = find_path(&arena, root, key)?;
        let mut cursor = Self::at(tree, &arena, path, pos)?;
        cursor.skip_forward(&arena)?;
        Ok(cursor)
    }

    /// Positions on the smallest entry, or at the end of an empty tree.
    pub(crate) fn first(tree: &'v CowTree<K, V>, root: NodeRef) -> CowTreeResult<Self> {
        let arena = tree.arena.read();
        let path = edge_path(&arena, root, Direction::Forward)?;
        let mut cursor = Self::at(tree, &arena, path, 0)?;
        cursor.skip_forward(&arena)?;
        Ok(cursor)
    }

    /// Positions on the largest entry, or before the beginning of an empty
    /// tree.
    pub(crate) fn last(tree: &'v CowTree<K, V>, root: NodeRef) -> CowTreeResult<Self> {
        let arena = tree.arena.read();
        let path = edge_path(&arena, root, Direction::Backward)?;
        let mut cursor = Self::at(tree, &arena, path, 0)?;
        cursor.pos = cursor.len;
        cursor.skip_backward(&arena)?;
        Ok(cursor)
    }

    /// Positions one past the largest entry.
    pub(crate) fn end(tree: &'v CowTree<K, V>, root: NodeRef) -> CowTreeResult<Self> {
        let arena = tree.arena.read();
        let path = edge_path(&arena, root, Direction::Backward)?;
        let mut cursor = Self::at(tree, &arena, path, 0)?;
        cursor.pos = cursor.len;
        Ok(cursor)
    }

    /// Positions one before the smallest entry.
    pub(crate) fn rend(tree: &'v CowTree<K, V>, root: NodeRef) -> CowTreeResult<Self> {
        let arena = tree.arena.read();
        let path = edge_path(&arena, root, Direction::Forward)?;
        let mut cursor = Self::at(tree, &arena, path, 0)?;
        cursor.before_begin = true;
        Ok(cursor)
    }

    fn at(
        tree: &'v CowTree<K, V>,
        arena: &NodeArena<K, V>,
        path: Path,
        pos: usize,
    ) -> CowTreeResult<Self> {
        let len = arena.get(path.leaf()?)?.len();
        Ok(Self {
            tree,
            path,
            pos,
            len,
            before_begin: false,
        })
    }

    /// Returns true one past the largest entry.
    pub fn is_end(&self) -> bool {
        !self.before_begin && self.pos >= self.len
    }

    /// Returns true one before the smallest entry.
    pub fn is_before_begin(&self) -> bool {
        self.before_begin
    }

    /// Returns true if the cursor rests on an entry.
    pub fn is_valid(&self) -> bool {
        !self.before_begin && self.pos < self.len
    }

    /// Returns the key under the cursor.
    pub fn key(&self) -> CowTreeResult<K> {
        self.check_valid()?;
        let arena = self.tree.arena.read();
        Ok(arena.get(self.path.leaf()?)?.key(self.pos)?.clone())
    }

    /// Returns the value under the cursor.
    pub fn value(&self) -> CowTreeResult<V> {
        self.check_valid()?;
        let arena = self.tree.arena.read();
        Ok(arena.get(self.path.leaf()?)?.value(self.pos)?.clone())
    }

    /// Returns the entry under the cursor.
    pub fn entry(&self) -> CowTreeResult<(K, V)> {
        self.check_valid()?;
        let arena = self.tree.arena.read();
        self.entry_in(&arena)
    }

    /// Moves to the next entry. Returns false once the cursor reaches the
    /// end.
    pub fn advance(&mut self) -> CowTreeResult<bool> {
        let tree = self.tree;
        let arena = tree.arena.read();
        self.advance_in(&arena)?;
        Ok(!self.is_end())
    }

    /// Moves to the previous entry. Returns false once the cursor passes the
    /// beginning.
    pub fn retreat(&mut self) -> CowTreeResult<bool> {
        let tree = self.tree;
        let arena = tree.arena.read();
        self.retreat_in(&arena)?;
        Ok(!self.before_begin)
    }

    fn check_valid(&self) -> CowTreeResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CowTreeError::InvalidCursor)
        }
    }

    fn entry_in(&self, arena: &NodeArena<K, V>) -> CowTreeResult<(K, V)> {
        let leaf = arena.get(self.path.leaf()?)?;
        Ok((leaf.key(self.pos)?.clone(), leaf.value(self.pos)?.clone()))
    }

    fn advance_in(&mut self, arena: &NodeArena<K, V>) -> CowTreeResult<()> {
        if self.before_begin {
            self.before_begin = false;
            self.pos = 0;
        } else if self.pos < self.len {
            self.pos += 1;
        } else {
            return Ok(());
        }
        self.skip_forward(arena)
    }

    fn retreat_in(&mut self, arena: &NodeArena<K, V>) -> CowTreeResult<()> {
        if self.before_begin {
            return Ok(());
        }
        self.skip_backward(arena)
    }

    /// Moves off the end of a leaf onto the first entry of the next
    /// non-empty leaf, if any.
    fn skip_forward(&mut self, arena: &NodeArena<K, V>) -> CowTreeResult<()> {
        while self.pos >= self.len {
            let mut next = self.path.clone();
            if !step(arena, &mut next, 0, Direction::Forward)? {
                break;
            }
            self.len = arena.get(next.leaf()?)?.len();
            self.path = next;
            self.pos = 0;
        }
        Ok(())
    }

    /// Moves to the entry before the current position, crossing into
    /// previous leaves as needed.
    fn skip_backward(&mut self, arena: &NodeArena<K, V>) -> CowTreeResult<()> {
        while self.pos == 0 {
            let mut prev = self.path.clone();
            if !step(arena, &mut prev, 0, Direction::Backward)? {
                self.before_begin = true;
                return Ok(());
            }
            self.len = arena.get(prev.leaf()?)?.len();
            self.path = prev;
            self.pos = self.len;
        }
        self.pos -= 1;
        Ok(())
    }
}

impl<K, V> std::fmt::Debug for Cursor<'_, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("leaf", &self.path.as_slice().first())
            .field("pos", &self.pos)
            .field("len", &self.len)
            .field("before_begin", &self.before_begin)
            .finish()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Iterator over the entries of one version in key order or reverse key
/// order.
pub struct Iter<'v, K, V> {
    cursor: Cursor<'v, K, V>,
    direction: Direction,
    done: bool,
}

impl<'v, K: Ord + Clone, V: Clone> Iter<'v, K, V> {
    pub(crate) fn new(cursor: Cursor<'v, K, V>, direction: Direction) -> Self {
        Self {
            cursor,
            direction,
            done: false,
        }
    }

    fn next_in(&mut self, arena: &NodeArena<K, V>) -> CowTreeResult<(K, V)> {
        let entry = self.cursor.entry_in(arena)?;
        match self.direction {
            Direction::Forward => self.cursor.advance_in(arena)?,
            Direction::Backward => self.cursor.retreat_in(arena)?,
        }
        Ok(entry)
    }
}

impl<K: Ord + Clone, V: Clone> Iterator for Iter<'_, K, V> {
    type Item = CowTreeResult<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || !self.cursor.is_valid() {
            return None;
        }

        let tree = self.cursor.tree;
        let arena = tree.arena.read();
        let result = self.next_in(&arena);

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

/// Forward iterator over the entries inside a key range.
pub struct Range<'v, K, V> {
    iter: Iter<'v, K, V>,
    end: Bound<K>,
}

impl<'v, K: Ord + Clone, V: Clone> Range<'v, K, V> {
    pub(crate) fn new(cursor: Cursor<'v, K, V>, end: Bound<K>) -> Self {
        Self {
            iter: Iter::new(cursor, Direction::Forward),
            end,
        }
    }

    fn is_after_end(&self, key: &K) -> bool {
        match &self.end {
            Bound::Included(end) => key > end,
            Bound::Excluded(end) => key >= end,
            Bound::Unbounded => false,
        }
    }
}

impl<K: Ord + Clone, V: Clone> Iterator for Range<'_, K, V> {
    type Item = CowTreeResult<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.iter.next()? {
            Ok((key, value)) => {
                if self.is_after_end(&key) {
                    self.iter.done = true;
                    return None;
                }
                Some(Ok((key, value)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use crate::cowtree::error::CowTreeError;
    use crate::cowtree::view::ReadView;
    use crate::cowtree::CowTree;
    use cowstore_common::config::TreeConfig;

    fn tree_with(keys: impl IntoIterator<Item = u32>) -> CowTree<u32, u32> {
        let tree = CowTree::with_config(TreeConfig::for_testing()).unwrap();
        let mut txn = tree.transaction().unwrap();
        for key in keys {
            txn.assign(key, key * 10).unwrap();
        }
        txn.commit().unwrap();
        tree
    }

    #[test]
    fn test_empty_tree_cursors() {
        let tree = tree_with([]);
        let snapshot = tree.snapshot().unwrap();

        let begin = snapshot.begin().unwrap();
        assert!(begin.is_end());
        assert!(matches!(begin.key(), Err(CowTreeError::InvalidCursor)));

        let rbegin = snapshot.rbegin().unwrap();
        assert!(rbegin.is_before_begin());
        assert_eq!(snapshot.iter().unwrap().count(), 0);
    }

    #[test]
    fn test_forward_and_backward_walk() {
        let tree = tree_with(0..50);
        let snapshot = tree.snapshot().unwrap();

        let mut cursor = snapshot.begin().unwrap();
        let mut seen = Vec::new();
        while !cursor.is_end() {
            seen.push(cursor.key().unwrap());
            cursor.advance().unwrap();
        }
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
        assert!(!cursor.advance().unwrap());

        let mut seen = Vec::new();
        while cursor.retreat().unwrap() {
            seen.push(cursor.key().unwrap());
        }
        assert_eq!(seen, (0..50).rev().collect::<Vec<_>>());
        assert!(cursor.is_before_begin());

        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.entry().unwrap(), (0, 0));
    }

    #[test]
    fn test_locate() {
        let tree = tree_with((0..40).map(|k| k * 2));
        let snapshot = tree.snapshot().unwrap();

        assert_eq!(snapshot.locate(&10).unwrap().key().unwrap(), 10);
        assert_eq!(snapshot.locate(&11).unwrap().key().unwrap(), 12);
        assert_eq!(snapshot.locate(&0).unwrap().value().unwrap(), 0);
        assert!(snapshot.locate(&79).unwrap().is_end());
    }

    #[test]
    fn test_locate_across_leaf_boundary() {
        let tree = tree_with((0..40).map(|k| k * 2));
        let snapshot = tree.snapshot().unwrap();

        // Every odd key falls between two entries, some between leaves.
        for k in (1..78).step_by(2) {
            assert_eq!(snapshot.locate(&k).unwrap().key().unwrap(), k + 1);
        }
    }

    #[test]
    fn test_end_and_rend() {
        let tree = tree_with(0..20);
        let snapshot = tree.snapshot().unwrap();

        let mut end = snapshot.end().unwrap();
        assert!(end.is_end());
        assert!(end.retreat().unwrap());
        assert_eq!(end.key().unwrap(), 19);

        let mut rend = snapshot.rend().unwrap();
        assert!(rend.is_before_begin());
        assert!(rend.advance().unwrap());
        assert_eq!(rend.key().unwrap(), 0);
    }

    #[test]
    fn test_iter_rev() {
        let tree = tree_with(0..30);
        let snapshot = tree.snapshot().unwrap();

        let keys: Vec<u32> = snapshot
            .iter_rev()
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(keys, (0..30).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_range_bounds() {
        let tree = tree_with(0..100);
        let snapshot = tree.snapshot().unwrap();

        let keys = |entries: Vec<(u32, u32)>| entries.into_iter().map(|(k, _)| k).collect::<Vec<_>>();

        assert_eq!(keys(snapshot.scan(10..15).unwrap()), vec![10, 11, 12, 13, 14]);
        assert_eq!(keys(snapshot.scan(10..=12).unwrap()), vec![10, 11, 12]);
        assert_eq!(keys(snapshot.scan(97..).unwrap()), vec![97, 98, 99]);
        assert_eq!(keys(snapshot.scan(..3).unwrap()), vec![0, 1, 2]);
        assert!(snapshot.scan(200..300).unwrap().is_empty());

        let excluded = snapshot
            .scan((Bound::Excluded(5), Bound::Included(7)))
            .unwrap();
        assert_eq!(keys(excluded), vec![6, 7]);
    }
}
