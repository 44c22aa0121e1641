//! Structural checks, text dumps and version digests.

use std::fmt::{Debug, Write as _};
use std::hash::Hash;

use cowstore_common::config::TreeConfig;
use cowstore_common::types::{NodeId, VersionId};
use cowstore_mvcc::LogEntry;
use tracing::warn;

use super::arena::{NodeArena, NodeRef};
use super::error::{CowTreeError, CowTreeResult};
use super::node::{Node, NodeBody};
use super::tree::CowTree;

/// Shape of one validated tree version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeShape {
    /// Number of levels, 1 for a lone root leaf.
    pub height: usize,
    /// Number of leaves.
    pub leaf_count: usize,
    /// Number of branches.
    pub branch_count: usize,
    /// Number of entries across all leaves.
    pub entries: u64,
}

impl TreeShape {
    /// Returns the number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.leaf_count + self.branch_count
    }
}

/// Identity and keys of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary<K> {
    /// Arena handle.
    pub node: NodeRef,
    /// Diagnostic id, fresh for every clone.
    pub id: NodeId,
    /// Version that created the node.
    pub version: VersionId,
    /// Current owner count.
    pub refs: u32,
    /// Keys in order.
    pub keys: Vec<K>,
}

/// Summarizes the node behind `node_ref`.
pub fn summarize<K: Clone, V>(
    arena: &NodeArena<K, V>,
    node_ref: NodeRef,
) -> CowTreeResult<NodeSummary<K>> {
    let node = arena.get(node_ref)?;
    Ok(NodeSummary {
        node: node_ref,
        id: node.id(),
        version: node.version(),
        refs: node.refs(),
        keys: node.keys().to_vec(),
    })
}

struct Validator<'a, K, V> {
    arena: &'a NodeArena<K, V>,
    shape: TreeShape,
    leaf_depth: Option<usize>,
}

/// Walks the version rooted at `root` and checks:
///
/// - every node has an owner and is no newer than its parent
/// - no node is over capacity and only the root may be empty
/// - keys are strictly increasing and above the parent's previous key
/// - the search index matches the keys
/// - each branch key equals the largest key of its child
/// - all leaves sit at the same depth
/// - the root's entry count matches the leaves
pub fn validate<K: Ord + Clone, V>(
    arena: &NodeArena<K, V>,
    root: NodeRef,
    version: VersionId,
) -> CowTreeResult<TreeShape> {
    let mut validator = Validator {
        arena,
        shape: TreeShape::default(),
        leaf_depth: None,
    };
    validator.check(root, None, version, 0)?;

    let size = arena.get(root)?.metadata().size;
    if size != validator.shape.entries {
        return Err(CowTreeError::structure(format!(
            "root {root} records {size} entries but leaves hold {}",
            validator.shape.entries
        )));
    }

    validator.shape.height = validator.leaf_depth.map_or(1, |depth| depth + 1);
    Ok(validator.shape)
}

impl<K: Ord + Clone, V> Validator<'_, K, V> {
    fn check(
        &mut self,
        node_ref: NodeRef,
        lower: Option<&K>,
        max_version: VersionId,
        depth: usize,
    ) -> CowTreeResult<()> {
        let arena = self.arena;
        let node = arena.get(node_ref)?;
        let fail = |what: &str| Err(CowTreeError::structure(format!("node {node_ref}: {what}")));

        if node.refs() == 0 {
            return fail("no owners");
        }
        if node.version() > max_version {
            return fail("newer than its parent");
        }
        if node.len() > node.layout().capacity {
            return fail("over capacity");
        }
        if depth > 0 && node.is_empty() {
            return fail("empty non-root node");
        }
        if !node.keys().windows(2).all(|pair| pair[0] < pair[1]) {
            return fail("keys out of order");
        }
        if let (Some(lower), Some(first)) = (lower, node.keys().first()) {
            if first <= lower {
                return fail("key below the parent's range");
            }
        }
        if node.index() != expected_index(node).as_slice() {
            return fail("search index out of date");
        }

        match &node.body {
            NodeBody::Leaf(values) => {
                if values.len() != node.len() {
                    return fail("value count differs from key count");
                }
                match self.leaf_depth {
                    Some(expected) if expected != depth => return fail("leaf at uneven depth"),
                    Some(_) => {}
                    None => self.leaf_depth = Some(depth),
                }
                self.shape.leaf_count += 1;
                self.shape.entries += node.len() as u64;
            }
            NodeBody::Branch(children) => {
                if children.len() != node.len() {
                    return fail("child count differs from key count");
                }
                self.shape.branch_count += 1;

                let mut child_lower = lower;
                for (key, &child) in node.keys().iter().zip(children) {
                    if arena.get(child)?.max_key() != Some(key) {
                        return fail("branch key differs from child maximum");
                    }
                    self.check(child, child_lower, node.version(), depth + 1)?;
                    child_lower = Some(key);
                }
            }
        }

        Ok(())
    }
}

fn expected_index<K: Clone, V>(node: &Node<K, V>) -> Vec<K> {
    let width = node.layout().bucket_width;
    node.keys()
        .chunks(width)
        .filter_map(|bucket| bucket.last().cloned())
        .collect()
}

/// Renders the version rooted at `root`, one node per line.
pub fn dump<K: Debug, V: Debug>(arena: &NodeArena<K, V>, root: NodeRef) -> CowTreeResult<String> {
    let mut out = String::new();
    let size = arena.get(root)?.metadata().size;
    let _ = writeln!(out, "root {root} size={size}");

    let mut stack = vec![(root, 1usize)];
    while let Some((node_ref, indent)) = stack.pop() {
        let node = arena.get(node_ref)?;
        let pad = "  ".repeat(indent);

        match &node.body {
            NodeBody::Leaf(values) => {
                let _ = writeln!(
                    out,
                    "{pad}leaf {} {} v{} refs={} idx={:?} {:?} => {:?}",
                    node.id(),
                    node_ref,
                    node.version(),
                    node.refs(),
                    node.index(),
                    node.keys(),
                    values
                );
            }
            NodeBody::Branch(children) => {
                let _ = writeln!(
                    out,
                    "{pad}branch {} {} v{} refs={} idx={:?} {:?}",
                    node.id(),
                    node_ref,
                    node.version(),
                    node.refs(),
                    node.index(),
                    node.keys()
                );
                stack.extend(children.iter().rev().map(|&child| (child, indent + 1)));
            }
        }
    }

    Ok(out)
}

/// Hashes every node that `version` created, in depth-first order.
///
/// Nodes inherited from older versions are skipped along with their
/// subtrees, since a node never points at anything newer than itself.
pub fn version_digest<K: Hash, V: Hash>(
    arena: &NodeArena<K, V>,
    root: NodeRef,
    version: VersionId,
) -> CowTreeResult<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut stack = vec![root];

    while let Some(node_ref) = stack.pop() {
        let node = arena.get(node_ref)?;
        if node.version() != version {
            continue;
        }

        node.id().as_u64().hash(&mut hasher);
        node.metadata().size.hash(&mut hasher);
        node.keys().hash(&mut hasher);
        match &node.body {
            NodeBody::Leaf(values) => values.hash(&mut hasher),
            NodeBody::Branch(children) => {
                children.hash(&mut hasher);
                stack.extend(children.iter().rev().copied());
            }
        }
    }

    Ok(hasher.finalize())
}

impl<K: Ord + Clone + Hash, V: Clone + Hash> CowTree<K, V> {
    /// Creates a tree that records a digest of each committed version's own
    /// nodes, for later verification with [`CowTree::check_log`].
    pub fn with_digests(config: TreeConfig) -> CowTreeResult<Self> {
        let mut tree = Self::with_config(config)?;
        tree.digest = Some(version_digest::<K, V>);
        Ok(tree)
    }

    /// Recomputes the digest of every logged version that has one and
    /// returns the versions whose nodes no longer match.
    pub fn check_log(&self) -> CowTreeResult<Vec<VersionId>> {
        let arena = self.arena.read();
        let recorded: Vec<(VersionId, NodeRef, u32)> = self
            .log
            .lock()
            .iter()
            .filter_map(|entry| entry.digest().map(|digest| (entry.version(), entry.root(), digest)))
            .collect();

        let mut mismatched = Vec::new();
        for (version, root, digest) in recorded {
            if version_digest(&arena, root, version)? != digest {
                warn!(version = %version, "version digest mismatch");
                mismatched.push(version);
            }
        }
        Ok(mismatched)
    }
}

impl<K: Ord + Clone, V: Clone> CowTree<K, V> {
    /// Renders the version log, oldest entry first.
    pub fn dump_log(&self) -> String {
        let log = self.log.lock();
        let mut out = String::new();

        for entry in log.iter() {
            let _ = writeln!(out, "{}", describe_entry(entry));
        }
        out
    }
}

fn describe_entry(entry: &LogEntry<NodeRef>) -> String {
    let mut line = format!(
        "v{} root={} refs={}",
        entry.version(),
        entry.root(),
        entry.external_refs()
    );
    if entry.is_locked() {
        line.push_str(" locked");
    }
    if let Some(digest) = entry.digest() {
        let _ = write!(line, " digest={digest:08x}");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cowtree::view::ReadView;

    fn digest_tree() -> CowTree<u32, u32> {
        CowTree::with_digests(TreeConfig::for_testing()).unwrap()
    }

    #[test]
    fn test_validate_reports_shape() {
        let tree = digest_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..40 {
            txn.assign(i, i).unwrap();
        }

        let shape = txn.validate().unwrap();
        assert_eq!(shape.entries, 40);
        assert!(shape.height >= 2);
        assert!(shape.leaf_count >= 5);
        assert!(shape.branch_count >= 1);
    }

    #[test]
    fn test_validate_detects_stale_branch_key() {
        let tree = digest_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..20 {
            txn.assign(i, i).unwrap();
        }
        let root = txn.root();
        let version = txn.version();

        {
            let mut arena = tree.arena.write();
            let first = arena.get(root).unwrap().first_child().unwrap();
            let child_max = *arena.get(first).unwrap().max_key().unwrap();
            // Raise the first separator above its child's maximum.
            arena.get_mut(root).unwrap().set_key(0, child_max + 1).unwrap();
        }

        let arena = tree.arena.read();
        assert!(validate(&arena, root, version).is_err());
    }

    #[test]
    fn test_dump_lists_every_node() {
        let tree = digest_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..12 {
            txn.assign(i, i * 2).unwrap();
        }

        let shape = txn.validate().unwrap();
        let text = txn.dump().unwrap();
        assert!(text.starts_with("root "));
        assert_eq!(text.lines().count(), 1 + shape.node_count());
        assert!(text.contains("branch"));
        assert!(text.contains("=> [0, 2"));
    }

    #[test]
    fn test_check_log_clean() {
        let tree = digest_tree();
        for round in 0..5 {
            let mut txn = tree.transaction().unwrap();
            for i in 0..30 {
                txn.assign(i * (round + 1), round).unwrap();
            }
            txn.commit().unwrap();
        }

        assert!(tree.check_log().unwrap().is_empty());
        assert!(tree.dump_log().lines().all(|line| line.contains("digest=")));
    }

    #[test]
    fn test_check_log_detects_corruption() {
        let tree = digest_tree();
        let mut txn = tree.transaction().unwrap();
        for i in 0..30 {
            txn.assign(i, i).unwrap();
        }
        let v1 = txn.commit().unwrap();

        let root = tree.snapshot().unwrap().root();
        {
            let mut arena = tree.arena.write();
            let leaf = arena.get(root).unwrap().first_child().unwrap();
            arena.get_mut(leaf).unwrap().replace_value(0, 999).unwrap();
        }

        assert_eq!(tree.check_log().unwrap(), vec![v1]);
    }

    #[test]
    fn test_digests_survive_cleanup() {
        let tree = digest_tree();
        for round in 0..4 {
            let mut txn = tree.transaction().unwrap();
            for i in 0..25 {
                txn.assign(i, round).unwrap();
            }
            txn.commit().unwrap();
        }

        let pinned = tree.snapshot_at(tree.versions()[1]).unwrap();
        tree.cleanup_snapshots().unwrap();
        assert_eq!(tree.versions().len(), 2);
        assert!(tree.check_log().unwrap().is_empty());
        drop(pinned);
    }
}
