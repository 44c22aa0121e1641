//! System-wide constants for cowstore.
//!
//! This module defines the defaults and limits used by the tree engine.

// =============================================================================
// Node Layout Constants
// =============================================================================

/// Default node capacity in entries.
///
/// Both leaf and branch nodes hold up to this many keys.
pub const DEFAULT_NODE_SIZE: usize = 256;

/// Default width of one search-index bucket in entries.
///
/// Each node keeps one index entry (the bucket's maximum key) per bucket, so a
/// lookup scans `node_size / node_index_size` bounds before touching keys.
pub const DEFAULT_NODE_INDEX_SIZE: usize = 32;

/// Smallest node capacity accepted by the configuration.
///
/// Splitting at the midpoint must leave both halves non-empty and merging
/// must be able to make progress.
pub const MIN_NODE_SIZE: usize = 4;

// =============================================================================
// Garbage Collection Constants
// =============================================================================

/// Default node budget between garbage-collection passes.
///
/// When this many nodes have been allocated without any being reclaimed, the
/// next allocation runs a cleanup of unreferenced snapshots first.
pub const DEFAULT_NODE_BUDGET: usize = 100;

// =============================================================================
// Traversal Constants
// =============================================================================

/// Initial capacity reserved for a root-to-leaf path.
///
/// A tree of 256-entry nodes reaches billions of entries well before this
/// height; the path still grows past it if needed.
pub const PATH_INLINE_DEPTH: usize = 8;
