//! # cowstore-test
//!
//! Integration tests for cowstore.
//!
//! This crate contains:
//! - The concrete tree scenarios
//! - Snapshot isolation and cleanup checks
//! - Concurrent readers against a live writer
//! - Property tests against a `BTreeMap` oracle

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and helpers
pub mod utils;
