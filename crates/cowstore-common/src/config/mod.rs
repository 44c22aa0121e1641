//! Configuration for cowstore.
//!
//! This module provides the construction-time configuration of a tree.

mod tree;

pub use tree::TreeConfig;
