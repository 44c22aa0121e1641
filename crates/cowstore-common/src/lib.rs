//! # cowstore-common
//!
//! Common types, errors, and configuration for cowstore.
//!
//! This crate provides the foundational pieces shared by the version log and
//! the copy-on-write tree engine:
//!
//! - **Types**: version and node identifiers (`VersionId`, `NodeId`)
//! - **Errors**: configuration errors (`ConfigError`)
//! - **Config**: the construction-time `TreeConfig`
//! - **Constants**: defaults and limits
//!
//! ## Example
//!
//! ```rust
//! use cowstore_common::config::TreeConfig;
//! use cowstore_common::types::VersionId;
//!
//! let config = TreeConfig::default();
//! assert_eq!(config.node_size, 256);
//! assert!(VersionId::FIRST.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::TreeConfig;
pub use constants::*;
pub use error::{ConfigError, ConfigResult};
pub use types::{NodeId, VersionId};
