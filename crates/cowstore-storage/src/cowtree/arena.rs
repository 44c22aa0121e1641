//! Node storage.
//!
//! All nodes of every version live in one arena and are addressed by
//! generation-checked handles. A handle to a freed slot never resolves to the
//! node that later reuses the slot, so use-after-free becomes a
//! `DanglingNode` error instead of silent aliasing.
//!
//! Ownership is strictly parent to child plus log/transaction to root. Every
//! node carries the number of those owners; [`NodeArena::release`] drops one
//! ownership and tears down whatever becomes unreachable.

use std::fmt;

use cowstore_common::types::NodeId;
use cowstore_mvcc::NodeBudget;

use super::error::{CowTreeError, CowTreeResult};
use super::node::{Node, NodeBody};

/// Handle to a node slot in a [`NodeArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    index: u32,
    generation: u32,
}

impl NodeRef {
    /// Creates a handle from raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation this handle was issued for.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({}@{})", self.index, self.generation)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.generation)
    }
}

struct Slot<K, V> {
    generation: u32,
    node: Option<Node<K, V>>,
}

/// Slab of tree nodes shared by all versions of one tree.
///
/// The arena is not synchronized; the tree keeps it behind a reader-writer
/// lock.
pub struct NodeArena<K, V> {
    slots: Vec<Slot<K, V>>,
    free: Vec<u32>,
    live: usize,
    next_node_id: u64,
    budget: NodeBudget,
}

impl<K, V> NodeArena<K, V> {
    /// Creates an empty arena with the given allocation budget.
    pub fn new(node_budget: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            next_node_id: 1,
            budget: NodeBudget::new(node_budget),
        }
    }

    /// Returns the number of live nodes across all versions.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Returns the allocation budget.
    pub fn budget(&self) -> &NodeBudget {
        &self.budget
    }

    /// Returns the allocation budget for charging.
    pub fn budget_mut(&mut self) -> &mut NodeBudget {
        &mut self.budget
    }

    /// Hands out the next diagnostic node id.
    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    /// Returns true if the handle resolves to a live node.
    pub fn contains(&self, node: NodeRef) -> bool {
        self.get(node).is_ok()
    }

    /// Stores a node and returns its handle.
    pub fn alloc(&mut self, node: Node<K, V>) -> NodeRef {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeRef::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeRef::new(index, 0)
    }

    /// Resolves a handle.
    pub fn get(&self, node: NodeRef) -> CowTreeResult<&Node<K, V>> {
        self.slots
            .get(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(CowTreeError::DanglingNode(node))
    }

    /// Resolves a handle for mutation.
    pub fn get_mut(&mut self, node: NodeRef) -> CowTreeResult<&mut Node<K, V>> {
        self.slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(CowTreeError::DanglingNode(node))
    }

    /// Removes a node from the arena and returns it.
    ///
    /// The slot generation is bumped so outstanding handles stop resolving.
    /// Children of a freed branch are not touched.
    pub fn free(&mut self, node: NodeRef) -> CowTreeResult<Node<K, V>> {
        let slot = self
            .slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .ok_or(CowTreeError::DanglingNode(node))?;
        let removed = slot.node.take().ok_or(CowTreeError::DanglingNode(node))?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(node.index);
        self.live -= 1;
        self.budget.refund(1);

        Ok(removed)
    }

    /// Adds one owner to a node.
    pub fn add_ref(&mut self, node: NodeRef) -> CowTreeResult<u32> {
        let node = self.get_mut(node)?;
        node.refs += 1;
        Ok(node.refs)
    }

    /// Adds one owner to every child of a branch. Leaves are a no-op.
    pub fn ref_children(&mut self, node: NodeRef) -> CowTreeResult<()> {
        let children = match &self.get(node)?.body {
            NodeBody::Branch(children) => children.clone(),
            NodeBody::Leaf(_) => return Ok(()),
        };

        for child in children {
            self.add_ref(child)?;
        }
        Ok(())
    }

    /// Drops one owner of `node` and frees everything that becomes
    /// unreachable. Returns the number of nodes freed.
    ///
    /// A child is only descended into when the freed parent was its last
    /// owner; children still shared with a surviving version just lose one
    /// reference. The walk uses an explicit stack, so teardown depth is not
    /// bounded by the call stack.
    pub fn release(&mut self, node: NodeRef) -> CowTreeResult<usize> {
        let mut freed = 0;
        let mut pending = vec![node];

        while let Some(current) = pending.pop() {
            let entry = self.get_mut(current)?;
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs > 0 {
                continue;
            }

            let removed = self.free(current)?;
            freed += 1;

            if let NodeBody::Branch(children) = removed.body {
                pending.extend(children);
            }
        }

        Ok(freed)
    }
}
