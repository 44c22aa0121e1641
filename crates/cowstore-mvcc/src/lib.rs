//! # cowstore-mvcc
//!
//! Multi-version bookkeeping for cowstore.
//!
//! This crate implements the version-level pieces of the copy-on-write tree
//! that do not depend on the node layout:
//! - The version log of committed roots and their external reference counts
//! - The node budget that triggers reclamation as backpressure
//! - Reclamation statistics

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Ordered log of committed versions
pub mod log;

/// Node budget and reclamation statistics
pub mod gc;

pub use gc::{GcResult, GcStats, NodeBudget};
pub use log::{LogEntry, VersionLog};
