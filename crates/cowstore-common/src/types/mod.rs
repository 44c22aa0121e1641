//! Type definitions for cowstore.
//!
//! This module contains the identifier types used across the workspace.

mod ids;

pub use ids::{NodeId, VersionId};
