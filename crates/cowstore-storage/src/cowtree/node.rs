//! Tree node model.
//!
//! A node is a fixed-capacity sorted array of keys with a coarse search index
//! on top. Leaves carry values parallel to the keys; branches carry child
//! handles, and each branch key is the maximum key reachable through the
//! child in the same slot.
//!
//! ```text
//! keys:   [ 1  3  5  7 | 9 11 13 15 | 17 19 ]     bucket_width = 4
//! index:  [          7 |         15 |    19 ]
//! ```
//!
//! A lookup scans the index for the first bucket whose bound is not less
//! than the key, then searches only inside that bucket.

use std::fmt;

use cowstore_common::types::{NodeId, VersionId};

use super::arena::NodeRef;
use super::error::{CowTreeError, CowTreeResult};

/// Capacity and index layout shared by every node of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    /// Maximum number of entries.
    pub capacity: usize,
    /// Width of one search-index bucket.
    pub bucket_width: usize,
}

impl NodeLayout {
    /// Creates a layout.
    pub fn new(capacity: usize, bucket_width: usize) -> Self {
        Self {
            capacity,
            bucket_width: bucket_width.max(1),
        }
    }
}

/// Aggregate data kept on the root node only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootMetadata {
    /// Number of entries in the whole tree.
    pub size: u64,
}

/// Payload of a node.
#[derive(Clone)]
pub enum NodeBody<V> {
    /// Values parallel to the keys.
    Leaf(Vec<V>),
    /// Children parallel to the keys.
    Branch(Vec<NodeRef>),
}

/// A leaf or branch node of one tree version.
pub struct Node<K, V> {
    id: NodeId,
    version: VersionId,
    /// Number of owners: parent slots plus a log entry or transaction for
    /// a root.
    pub(crate) refs: u32,
    layout: NodeLayout,
    keys: Vec<K>,
    index: Vec<K>,
    metadata: RootMetadata,
    pub(crate) body: NodeBody<V>,
}

impl<K, V> Node<K, V> {
    /// Creates an empty leaf.
    pub fn new_leaf(id: NodeId, version: VersionId, layout: NodeLayout) -> Self {
        Self::with_body(id, version, layout, NodeBody::Leaf(Vec::with_capacity(layout.capacity)))
    }

    /// Creates an empty branch.
    pub fn new_branch(id: NodeId, version: VersionId, layout: NodeLayout) -> Self {
        Self::with_body(id, version, layout, NodeBody::Branch(Vec::with_capacity(layout.capacity)))
    }

    fn with_body(id: NodeId, version: VersionId, layout: NodeLayout, body: NodeBody<V>) -> Self {
        Self {
            id,
            version,
            refs: 0,
            layout,
            keys: Vec::with_capacity(layout.capacity),
            index: Vec::new(),
            metadata: RootMetadata::default(),
            body,
        }
    }

    /// Returns the diagnostic node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the version this node was created in.
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Returns the number of owners.
    pub fn refs(&self) -> u32 {
        self.refs
    }

    /// Returns the layout.
    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the node holds no entries.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns true for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    /// Returns true for branches.
    pub fn is_branch(&self) -> bool {
        !self.is_leaf()
    }

    /// Returns "leaf" or "branch".
    pub fn kind(&self) -> &'static str {
        if self.is_leaf() {
            "leaf"
        } else {
            "branch"
        }
    }

    /// Returns the keys.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Returns the key at `pos`.
    pub fn key(&self, pos: usize) -> CowTreeResult<&K> {
        self.keys
            .get(pos)
            .ok_or_else(|| self.out_of_range(pos))
    }

    /// Returns the search index, one bound per filled bucket.
    pub fn index(&self) -> &[K] {
        &self.index
    }

    /// Returns the largest key.
    pub fn max_key(&self) -> Option<&K> {
        self.keys.last()
    }

    /// Returns the root metadata.
    pub fn metadata(&self) -> RootMetadata {
        self.metadata
    }

    /// Returns the root metadata for update.
    pub fn metadata_mut(&mut self) -> &mut RootMetadata {
        &mut self.metadata
    }

    /// Returns true if `count` more entries fit.
    pub fn has_space(&self, count: usize) -> bool {
        self.keys.len() + count <= self.layout.capacity
    }

    /// Returns true once the node has fallen to half occupancy or below.
    pub fn should_merge(&self) -> bool {
        self.keys.len() <= self.layout.capacity / 2
    }

    /// Returns true if both nodes' entries fit into one node.
    pub fn can_merge_with(&self, other: &Self) -> bool {
        self.keys.len() + other.keys.len() <= self.layout.capacity
    }

    /// Returns the leaf values.
    pub fn values(&self) -> CowTreeResult<&[V]> {
        match &self.body {
            NodeBody::Leaf(values) => Ok(values),
            NodeBody::Branch(_) => Err(Self::type_error("leaf", "branch")),
        }
    }

    /// Returns the value at `pos`.
    pub fn value(&self, pos: usize) -> CowTreeResult<&V> {
        self.values()?
            .get(pos)
            .ok_or_else(|| self.out_of_range(pos))
    }

    /// Returns the branch children.
    pub fn children(&self) -> CowTreeResult<&[NodeRef]> {
        match &self.body {
            NodeBody::Branch(children) => Ok(children),
            NodeBody::Leaf(_) => Err(Self::type_error("branch", "leaf")),
        }
    }

    /// Returns the child at `pos`.
    pub fn child(&self, pos: usize) -> CowTreeResult<NodeRef> {
        self.children()?
            .get(pos)
            .copied()
            .ok_or_else(|| self.out_of_range(pos))
    }

    /// Returns the first child.
    pub fn first_child(&self) -> CowTreeResult<NodeRef> {
        self.child(0)
    }

    /// Returns the last child.
    pub fn last_child(&self) -> CowTreeResult<NodeRef> {
        self.child(self.len().wrapping_sub(1))
    }

    /// Returns the slot holding `child`.
    pub fn find_child_node(&self, child: NodeRef) -> Option<usize> {
        match &self.body {
            NodeBody::Branch(children) => children.iter().position(|c| *c == child),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Replaces the child at `pos` and returns the displaced handle.
    pub fn set_child(&mut self, pos: usize, child: NodeRef) -> CowTreeResult<NodeRef> {
        if pos >= self.len() {
            return Err(self.out_of_range(pos));
        }
        let children = self.children_mut()?;
        Ok(std::mem::replace(&mut children[pos], child))
    }

    /// Replaces the value at `pos` and returns the previous one.
    pub fn replace_value(&mut self, pos: usize, value: V) -> CowTreeResult<V> {
        if pos >= self.len() {
            return Err(self.out_of_range(pos));
        }
        let values = self.values_mut()?;
        Ok(std::mem::replace(&mut values[pos], value))
    }

    fn values_mut(&mut self) -> CowTreeResult<&mut Vec<V>> {
        match &mut self.body {
            NodeBody::Leaf(values) => Ok(values),
            NodeBody::Branch(_) => Err(Self::type_error("leaf", "branch")),
        }
    }

    fn children_mut(&mut self) -> CowTreeResult<&mut Vec<NodeRef>> {
        match &mut self.body {
            NodeBody::Branch(children) => Ok(children),
            NodeBody::Leaf(_) => Err(Self::type_error("branch", "leaf")),
        }
    }

    fn type_error(expected: &'static str, found: &'static str) -> CowTreeError {
        CowTreeError::InvalidNodeType { expected, found }
    }

    fn out_of_range(&self, pos: usize) -> CowTreeError {
        CowTreeError::structure(format!(
            "position {pos} out of range for {} node {} with {} entries",
            self.kind(),
            self.id,
            self.keys.len()
        ))
    }

    fn overflow(&self) -> CowTreeError {
        CowTreeError::structure(format!(
            "node {} is full ({} entries)",
            self.id, self.layout.capacity
        ))
    }
}

impl<K: Ord + Clone, V> Node<K, V> {
    /// Returns the position of the first key not less than `key`, or `len()`
    /// if every key is smaller.
    pub fn find_key(&self, key: &K) -> usize {
        let width = self.layout.bucket_width;

        for (bucket, bound) in self.index.iter().enumerate() {
            if bound >= key {
                let start = bucket * width;
                let end = (start + width).min(self.keys.len());
                return start + self.keys[start..end].partition_point(|k| k < key);
            }
        }

        self.keys.len()
    }

    /// Returns the slot of the child whose subtree covers `key`.
    ///
    /// Keys above the branch maximum route to the last child.
    pub fn find_child(&self, key: &K) -> CowTreeResult<(usize, NodeRef)> {
        if self.is_empty() {
            return Err(CowTreeError::structure(format!(
                "branch node {} has no children",
                self.id
            )));
        }

        let pos = self.find_key(key).min(self.len() - 1);
        Ok((pos, self.child(pos)?))
    }

    /// Inserts a leaf entry at `pos`.
    pub fn insert_value(&mut self, pos: usize, key: K, value: V) -> CowTreeResult<()> {
        if !self.has_space(1) {
            return Err(self.overflow());
        }
        if pos > self.len() {
            return Err(self.out_of_range(pos));
        }

        self.values_mut()?.insert(pos, value);
        self.keys.insert(pos, key);
        self.reindex_from(pos);
        Ok(())
    }

    /// Inserts a branch entry at `pos`.
    pub fn insert_child(&mut self, pos: usize, key: K, child: NodeRef) -> CowTreeResult<()> {
        if !self.has_space(1) {
            return Err(self.overflow());
        }
        if pos > self.len() {
            return Err(self.out_of_range(pos));
        }

        self.children_mut()?.insert(pos, child);
        self.keys.insert(pos, key);
        self.reindex_from(pos);
        Ok(())
    }

    /// Removes the leaf entry at `pos`.
    pub fn remove_value(&mut self, pos: usize) -> CowTreeResult<(K, V)> {
        if pos >= self.len() {
            return Err(self.out_of_range(pos));
        }

        let value = self.values_mut()?.remove(pos);
        let key = self.keys.remove(pos);
        self.reindex_from(pos);
        Ok((key, value))
    }

    /// Removes the branch entry at `pos`.
    pub fn remove_child(&mut self, pos: usize) -> CowTreeResult<(K, NodeRef)> {
        if pos >= self.len() {
            return Err(self.out_of_range(pos));
        }

        let child = self.children_mut()?.remove(pos);
        let key = self.keys.remove(pos);
        self.reindex_from(pos);
        Ok((key, child))
    }

    /// Overwrites the key at `pos`.
    pub fn set_key(&mut self, pos: usize, key: K) -> CowTreeResult<()> {
        if pos >= self.len() {
            return Err(self.out_of_range(pos));
        }
        self.keys[pos] = key;
        self.reindex_from(pos);
        Ok(())
    }

    /// Moves the entries `[at, len)` into a new sibling of the same kind.
    ///
    /// The sibling inherits the version and layout, starts without owners
    /// and without root metadata.
    pub fn split_off(&mut self, at: usize, id: NodeId) -> CowTreeResult<Self> {
        if at > self.len() {
            return Err(self.out_of_range(at));
        }

        let body = match &mut self.body {
            NodeBody::Leaf(values) => NodeBody::Leaf(values.split_off(at)),
            NodeBody::Branch(children) => NodeBody::Branch(children.split_off(at)),
        };

        let mut sibling = Self::with_body(id, self.version, self.layout, body);
        sibling.keys = self.keys.split_off(at);
        sibling.reindex_from(0);
        self.reindex_from(at);

        Ok(sibling)
    }

    /// Appends every entry of `other`, which must be of the same kind and
    /// fit into the remaining capacity.
    pub fn append(&mut self, other: Self) -> CowTreeResult<()> {
        if !self.can_merge_with(&other) {
            return Err(self.overflow());
        }

        let start = self.len();
        match (&mut self.body, other.body) {
            (NodeBody::Leaf(values), NodeBody::Leaf(more)) => values.extend(more),
            (NodeBody::Branch(children), NodeBody::Branch(more)) => children.extend(more),
            (NodeBody::Leaf(_), NodeBody::Branch(_)) => {
                return Err(Self::type_error("leaf", "branch"))
            }
            (NodeBody::Branch(_), NodeBody::Leaf(_)) => {
                return Err(Self::type_error("branch", "leaf"))
            }
        }

        self.keys.extend(other.keys);
        self.reindex_from(start);
        Ok(())
    }

    /// Rebuilds the index for every bucket at or after the one holding `pos`.
    fn reindex_from(&mut self, pos: usize) {
        let width = self.layout.bucket_width;
        let first = (pos / width).min(self.index.len());
        self.index.truncate(first);

        let mut bucket = first;
        while bucket * width < self.keys.len() {
            let last = ((bucket + 1) * width).min(self.keys.len()) - 1;
            self.index.push(self.keys[last].clone());
            bucket += 1;
        }
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Copies this node under a new id and version.
    ///
    /// The copy is shallow: a branch copy points at the same children. It
    /// starts without owners; root metadata is carried over.
    pub fn clone_as(&self, id: NodeId, version: VersionId) -> Self {
        Self {
            id,
            version,
            refs: 0,
            layout: self.layout,
            keys: self.keys.clone(),
            index: self.index.clone(),
            metadata: self.metadata,
            body: self.body.clone(),
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Node<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("id", &self.id)
            .field("version", &self.version)
            .field("refs", &self.refs)
            .field("keys", &self.keys)
            .finish()
    }
}
