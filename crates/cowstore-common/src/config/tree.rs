//! Tree configuration.
//!
//! The three values here are fixed when a tree is constructed and may not
//! change for the lifetime of that tree.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    DEFAULT_NODE_BUDGET, DEFAULT_NODE_INDEX_SIZE, DEFAULT_NODE_SIZE, MIN_NODE_SIZE,
};
use crate::error::{ConfigError, ConfigResult};

/// Configuration for a copy-on-write tree instance.
///
/// # Example
///
/// ```rust
/// use cowstore_common::config::TreeConfig;
///
/// let config = TreeConfig::new()
///     .with_node_size(64)
///     .with_node_index_size(8);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.index_buckets(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of entries in a leaf or branch node.
    /// Default: 256
    #[serde(default = "default_node_size")]
    pub node_size: usize,

    /// Width of one search-index bucket in entries.
    /// Default: 32
    #[serde(default = "default_node_index_size")]
    pub node_index_size: usize,

    /// Number of node allocations allowed between cleanup passes.
    /// Default: 100
    #[serde(default = "default_node_budget")]
    pub node_budget: usize,
}

fn default_node_size() -> usize {
    DEFAULT_NODE_SIZE
}

fn default_node_index_size() -> usize {
    DEFAULT_NODE_INDEX_SIZE
}

fn default_node_budget() -> usize {
    DEFAULT_NODE_BUDGET
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            node_size: default_node_size(),
            node_index_size: default_node_index_size(),
            node_budget: default_node_budget(),
        }
    }
}

impl TreeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with small nodes, so that splits, merges and
    /// multi-level trees appear after a handful of inserts.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            node_size: 8,
            node_index_size: 4,
            node_budget: DEFAULT_NODE_BUDGET,
        }
    }

    /// Sets the node capacity.
    #[must_use]
    pub fn with_node_size(mut self, node_size: usize) -> Self {
        self.node_size = node_size;
        self
    }

    /// Sets the search-index bucket width.
    #[must_use]
    pub fn with_node_index_size(mut self, node_index_size: usize) -> Self {
        self.node_index_size = node_index_size;
        self
    }

    /// Sets the node budget between cleanup passes.
    #[must_use]
    pub fn with_node_budget(mut self, node_budget: usize) -> Self {
        self.node_budget = node_budget;
        self
    }

    /// Number of index buckets each node carries.
    #[must_use]
    pub fn index_buckets(&self) -> usize {
        self.node_size.div_ceil(self.node_index_size.max(1))
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_size < MIN_NODE_SIZE {
            return Err(ConfigError::invalid(format!(
                "node_size must be at least {MIN_NODE_SIZE}, got {}",
                self.node_size
            )));
        }

        if self.node_index_size == 0 {
            return Err(ConfigError::invalid("node_index_size must be non-zero"));
        }

        if self.node_index_size > self.node_size {
            return Err(ConfigError::invalid(format!(
                "node_index_size ({}) must not exceed node_size ({})",
                self.node_index_size, self.node_size
            )));
        }

        if self.node_budget == 0 {
            return Err(ConfigError::invalid("node_budget must be non-zero"));
        }

        Ok(())
    }

    /// Parses and validates a configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Saves the configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts the configuration to a TOML string.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
