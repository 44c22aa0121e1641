//! Core identifier types for cowstore.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version identifier - the version in which a tree node was created.
///
/// Every transaction allocates a fresh, strictly increasing version id.
/// A node may only be mutated by the transaction whose version id equals
/// the node's own version id; any older node is cloned first.
///
/// # Example
///
/// ```rust
/// use cowstore_common::types::VersionId;
///
/// let v = VersionId::FIRST;
/// assert!(v < v.next());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct VersionId(u64);

impl VersionId {
    /// Invalid version ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// First version handed out by a fresh tree.
    pub const FIRST: Self = Self(1);

    /// Creates a new `VersionId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next version ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid version ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "VersionId(INVALID)")
        } else {
            write!(f, "VersionId({})", self.0)
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VersionId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<VersionId> for u64 {
    #[inline]
    fn from(id: VersionId) -> Self {
        id.0
    }
}

/// Node identifier - a process-unique number assigned to every node instance.
///
/// Node ids are diagnostic only: a clone of a node gets a new id, so two
/// versions of "the same" logical node can be told apart in dumps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Invalid node ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Creates a new `NodeId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Checks if this is a valid node ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeId(INVALID)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_id_ordering() {
        let v1 = VersionId::FIRST;
        let v2 = v1.next();
        assert!(v1 < v2);
        assert_eq!(v2.as_u64(), 2);
        assert!(!VersionId::INVALID.is_valid());
        assert!(v1.is_valid());
    }

    #[test]
    fn test_version_id_saturates() {
        let max = VersionId::new(u64::MAX);
        assert_eq!(max.next(), max);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", VersionId::INVALID), "VersionId(INVALID)");
        assert_eq!(format!("{:?}", VersionId::new(7)), "VersionId(7)");
        assert_eq!(format!("{:?}", NodeId::new(3)), "NodeId(3)");
        assert_eq!(format!("{}", NodeId::new(3)), "3");
    }

    #[test]
    fn test_conversions() {
        let v: VersionId = 42u64.into();
        let raw: u64 = v.into();
        assert_eq!(raw, 42);

        let n: NodeId = 9u64.into();
        assert!(n.is_valid());
        assert!(!NodeId::INVALID.is_valid());
    }
}
