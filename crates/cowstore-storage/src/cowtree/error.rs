//! Error types for the copy-on-write tree.
//!
//! Misuse of the transaction protocol and internal consistency violations are
//! reported as typed errors instead of panics. Node lookups that would read
//! out of range or through a freed handle surface as `DanglingNode` or
//! `TreeStructure`.

use cowstore_common::error::ConfigError;
use cowstore_common::types::VersionId;
use thiserror::Error;

use super::arena::NodeRef;

/// Result type for copy-on-write tree operations.
pub type CowTreeResult<T> = Result<T, CowTreeError>;

/// Errors that can occur in copy-on-write tree operations.
#[derive(Debug, Error)]
pub enum CowTreeError {
    /// Another transaction is outstanding against the same tree.
    #[error("there is another active transaction for this tree")]
    AlreadyActiveTransaction,

    /// A mutation reached a node that belongs to a different version.
    #[error("stale node write: node {node} has version {node_version}, transaction is {txn_version}")]
    StaleNodeWrite {
        /// The node that would have been mutated.
        node: NodeRef,
        /// Version the node was created in.
        node_version: VersionId,
        /// Version of the writing transaction.
        txn_version: VersionId,
    },

    /// A node handle points at a freed or never-allocated slot.
    #[error("dangling node reference: {0}")]
    DanglingNode(NodeRef),

    /// A leaf was expected where a branch was found, or vice versa.
    #[error("invalid node type: expected {expected}, found {found}")]
    InvalidNodeType {
        /// Expected node type.
        expected: &'static str,
        /// Found node type.
        found: &'static str,
    },

    /// Tree structure is invalid.
    #[error("tree structure error: {0}")]
    TreeStructure(String),

    /// Cursor is positioned outside the entries of its view.
    #[error("cursor is invalid or exhausted")]
    InvalidCursor,

    /// The tree was constructed with an invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CowTreeError {
    /// Creates a new tree structure error.
    pub fn structure(msg: impl Into<String>) -> Self {
        Self::TreeStructure(msg.into())
    }

    /// Creates a new stale write error.
    pub fn stale_write(node: NodeRef, node_version: VersionId, txn_version: VersionId) -> Self {
        Self::StaleNodeWrite {
            node,
            node_version,
            txn_version,
        }
    }

    /// Returns true if the caller may retry the operation later.
    ///
    /// Only a busy writer slot is transient; every other error signals a
    /// misuse or a corrupted structure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AlreadyActiveTransaction)
    }

    /// Returns a stable numeric code for the error kind.
    pub fn code(&self) -> u16 {
        match self {
            Self::AlreadyActiveTransaction => 1,
            Self::StaleNodeWrite { .. } => 2,
            Self::DanglingNode(_) => 3,
            Self::InvalidNodeType { .. } => 4,
            Self::TreeStructure(_) => 5,
            Self::InvalidCursor => 6,
            Self::Config(_) => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CowTreeError::AlreadyActiveTransaction;
        assert_eq!(
            err.to_string(),
            "there is another active transaction for this tree"
        );

        let err = CowTreeError::stale_write(NodeRef::new(4, 1), VersionId::new(2), VersionId::new(3));
        let msg = err.to_string();
        assert!(msg.contains("version 2"));
        assert!(msg.contains("transaction is 3"));

        let err = CowTreeError::structure("branch without children");
        assert!(err.to_string().contains("branch without children"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CowTreeError::AlreadyActiveTransaction.is_retryable());
        assert!(!CowTreeError::InvalidCursor.is_retryable());
        assert!(!CowTreeError::DanglingNode(NodeRef::new(0, 0)).is_retryable());

        assert_eq!(CowTreeError::AlreadyActiveTransaction.code(), 1);
        assert_eq!(
            CowTreeError::stale_write(NodeRef::new(0, 0), VersionId::FIRST, VersionId::FIRST).code(),
            2
        );
    }

    #[test]
    fn test_error_from_config() {
        let err: CowTreeError = ConfigError::invalid("node_budget must be non-zero").into();
        assert!(matches!(err, CowTreeError::Config(_)));
        assert_eq!(err.code(), 7);
    }
}
