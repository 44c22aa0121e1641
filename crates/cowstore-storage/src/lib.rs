//! # cowstore-storage
//!
//! Copy-on-write tree engine for cowstore.
//!
//! This crate implements the in-memory multi-version B+Tree:
//! - Nodes with a bucketed search index
//! - A single writable transaction working on path copies
//! - Concurrent snapshots of committed versions
//! - Reference-counted reclamation of superseded versions

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Copy-on-write multi-version B+Tree
pub mod cowtree;
