//! Root-to-leaf paths.
//!
//! A [`Path`] records the nodes visited by one descent, leaf first: level 0
//! is the leaf and the last level is the root. Nodes do not link to their
//! parents or siblings, so every upward step and every move to a neighbouring
//! leaf goes through a path.

use cowstore_common::constants::PATH_INLINE_DEPTH;

use super::arena::{NodeArena, NodeRef};
use super::error::{CowTreeError, CowTreeResult};

/// Direction of a sibling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards larger keys.
    Forward,
    /// Towards smaller keys.
    Backward,
}

/// Stack of nodes from a leaf up to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    levels: Vec<NodeRef>,
}

impl Path {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self {
            levels: Vec::with_capacity(PATH_INLINE_DEPTH),
        }
    }

    /// Returns the number of levels, which is the tree height.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns true if the path holds no node.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Returns the leaf.
    pub fn leaf(&self) -> CowTreeResult<NodeRef> {
        self.get(0)
    }

    /// Returns the root.
    pub fn root(&self) -> CowTreeResult<NodeRef> {
        self.get(self.levels.len().wrapping_sub(1))
    }

    /// Returns the index of the root level.
    pub fn root_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Returns true if `level` is the root level.
    pub fn is_root(&self, level: usize) -> bool {
        level + 1 == self.levels.len()
    }

    /// Returns the node at `level`.
    pub fn get(&self, level: usize) -> CowTreeResult<NodeRef> {
        self.levels
            .get(level)
            .copied()
            .ok_or_else(|| Self::missing(level))
    }

    /// Returns the parent of the node at `level`, if it is not the root.
    pub fn parent(&self, level: usize) -> Option<NodeRef> {
        self.levels.get(level + 1).copied()
    }

    /// Replaces the node at `level`.
    pub fn set(&mut self, level: usize, node: NodeRef) -> CowTreeResult<()> {
        let slot = self
            .levels
            .get_mut(level)
            .ok_or_else(|| Self::missing(level))?;
        *slot = node;
        Ok(())
    }

    /// Adds a new root above the current one.
    pub fn push_root(&mut self, root: NodeRef) {
        self.levels.push(root);
    }

    /// Removes the root level.
    pub fn pop_root(&mut self) -> Option<NodeRef> {
        self.levels.pop()
    }

    /// Returns the levels, leaf first.
    pub fn as_slice(&self) -> &[NodeRef] {
        &self.levels
    }

    fn missing(level: usize) -> CowTreeError {
        CowTreeError::structure(format!("path has no level {level}"))
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::new()
    }
}

/// Descends from `root` towards `key`.
///
/// Returns the path and the position of the first leaf key not less than
/// `key`. Keys above the tree maximum end on the last leaf with the position
/// equal to its length.
pub fn find_path<K: Ord + Clone, V>(
    arena: &NodeArena<K, V>,
    root: NodeRef,
    key: &K,
) -> CowTreeResult<(Path, usize)> {
    let mut top_down = Vec::with_capacity(PATH_INLINE_DEPTH);
    let mut current = root;

    let pos = loop {
        top_down.push(current);
        let node = arena.get(current)?;
        if node.is_leaf() {
            break node.find_key(key);
        }
        current = node.find_child(key)?.1;
    };

    top_down.reverse();
    Ok((Path { levels: top_down }, pos))
}

/// Descends from `root` along the first or last child at every level.
pub fn edge_path<K, V>(
    arena: &NodeArena<K, V>,
    root: NodeRef,
    direction: Direction,
) -> CowTreeResult<Path> {
    let mut top_down = Vec::with_capacity(PATH_INLINE_DEPTH);
    let mut current = root;

    loop {
        top_down.push(current);
        let node = arena.get(current)?;
        if node.is_leaf() {
            break;
        }
        current = match direction {
            Direction::Forward => node.first_child()?,
            Direction::Backward => node.last_child()?,
        };
    }

    top_down.reverse();
    Ok(Path { levels: top_down })
}

/// Moves the node at `level` to its neighbour in `direction`, crossing
/// parents as needed, and re-descends the levels below it along the edge
/// facing the old position.
///
/// Returns false and leaves the path untouched if there is no neighbour.
pub fn step<K, V>(
    arena: &NodeArena<K, V>,
    path: &mut Path,
    level: usize,
    direction: Direction,
) -> CowTreeResult<bool> {
    let mut moved = path.clone();
    if !step_level(arena, &mut moved, level, direction)? {
        return Ok(false);
    }

    *path = moved;
    Ok(true)
}

fn step_level<K, V>(
    arena: &NodeArena<K, V>,
    path: &mut Path,
    level: usize,
    direction: Direction,
) -> CowTreeResult<bool> {
    let Some(parent_ref) = path.parent(level) else {
        return Ok(false);
    };

    let parent = arena.get(parent_ref)?;
    let node = path.get(level)?;
    let pos = parent.find_child_node(node).ok_or_else(|| {
        CowTreeError::structure(format!(
            "node {node} is not a child of {parent_ref} on the path"
        ))
    })?;

    let target = match direction {
        Direction::Forward => (pos + 1 < parent.len()).then_some(pos + 1),
        Direction::Backward => pos.checked_sub(1),
    };

    match target {
        Some(target) => {
            path.set(level, parent.child(target)?)?;
            descend_edge(arena, path, level, direction)?;
            Ok(true)
        }
        None => step_level(arena, path, level + 1, direction),
    }
}

/// Refills the levels below `level` with the edge children facing the
/// direction of travel.
fn descend_edge<K, V>(
    arena: &NodeArena<K, V>,
    path: &mut Path,
    level: usize,
    direction: Direction,
) -> CowTreeResult<()> {
    for below in (0..level).rev() {
        let node = arena.get(path.get(below + 1)?)?;
        let child = match direction {
            Direction::Forward => node.first_child()?,
            Direction::Backward => node.last_child()?,
        };
        path.set(below, child)?;
    }
    Ok(())
}
