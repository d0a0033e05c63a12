//! Options for formatting a fresh tree.
//!
//! # Invariants
//!
//! After `validate()` succeeds:
//! - `node_size` is a power of two between 512 and 32768
//! - `clump_size` is a non-zero multiple of `node_size`
//! - an index record with a `max_key_length` key fits in half a node
//! - `total_nodes` leaves room for the header node and its map nodes

use serde::{Deserialize, Serialize};

use crate::format::map_nodes_needed;
use crate::header::{BIG_KEYS_MASK, HFS_BTREE_TYPE, VARIABLE_INDEX_KEYS_MASK};
use crate::node::{CHILD_POINTER_SIZE, KEY_LENGTH_SIZE, MAX_NODE_SIZE, MIN_NODE_SIZE, max_record_size};

/// Layout parameters of a new tree.
///
/// Serializable so callers can keep tree layouts in their own config files.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    /// Size of every node in bytes.
    pub node_size: u16,
    /// Number of nodes the store is sized for up front.
    pub total_nodes: u32,
    /// Bytes added to the store each time the tree runs out of nodes.
    pub clump_size: u32,
    /// Longest key body accepted by `insert`.
    pub max_key_length: u16,
    pub btree_type: u8,
    pub key_compare_type: u8,
    pub attributes: u32,
}

impl FormatOptions {
    /// Node size used by the catalog tree on HFS+ volumes.
    pub const DEFAULT_NODE_SIZE: u16 = 4096;
    /// Longest catalog key on HFS+ volumes.
    pub const DEFAULT_MAX_KEY_LENGTH: u16 = 516;
    pub const DEFAULT_TOTAL_NODES: u32 = 64;

    /// Check the options describe a tree that can be formatted.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let node_size = usize::from(self.node_size);
        if !node_size.is_power_of_two() || !(MIN_NODE_SIZE..=MAX_NODE_SIZE).contains(&node_size) {
            return Err(ConfigError::InvalidValue {
                name: "node_size",
                message: format!(
                    "{node_size} is not a power of two between {MIN_NODE_SIZE} and {MAX_NODE_SIZE}"
                ),
            });
        }

        let clump_size = self.clump_size as usize;
        if clump_size == 0 || clump_size % node_size != 0 {
            return Err(ConfigError::InvalidValue {
                name: "clump_size",
                message: format!("{clump_size} is not a non-zero multiple of the node size"),
            });
        }

        let index_record = KEY_LENGTH_SIZE + usize::from(self.max_key_length) + CHILD_POINTER_SIZE;
        if self.max_key_length == 0 || index_record > max_record_size(node_size) {
            return Err(ConfigError::InvalidValue {
                name: "max_key_length",
                message: format!(
                    "{} does not fit a {node_size}-byte node",
                    self.max_key_length
                ),
            });
        }

        let reserved = 1 + map_nodes_needed(node_size, self.total_nodes);
        if self.total_nodes < reserved {
            return Err(ConfigError::InvalidValue {
                name: "total_nodes",
                message: format!(
                    "{} is less than the {reserved} nodes needed for the header and bitmap",
                    self.total_nodes
                ),
            });
        }

        Ok(())
    }
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            node_size: Self::DEFAULT_NODE_SIZE,
            total_nodes: Self::DEFAULT_TOTAL_NODES,
            clump_size: u32::from(Self::DEFAULT_NODE_SIZE) * Self::DEFAULT_TOTAL_NODES,
            max_key_length: Self::DEFAULT_MAX_KEY_LENGTH,
            btree_type: HFS_BTREE_TYPE,
            key_compare_type: 0,
            attributes: BIG_KEYS_MASK | VARIABLE_INDEX_KEYS_MASK,
        }
    }
}

/// Error returned when format options are invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let options = FormatOptions::default();
        options.validate().expect("valid");
        assert_eq!(options.node_size, 4096);
        assert_eq!(options.clump_size, 4096 * 64);
    }

    #[test]
    fn test_rejects_odd_node_size() {
        let options = FormatOptions {
            node_size: 1000,
            ..FormatOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidValue { name: "node_size", .. })
        ));

        let options = FormatOptions {
            node_size: 256,
            ..FormatOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_partial_clump() {
        let options = FormatOptions {
            clump_size: 4096 + 100,
            ..FormatOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidValue { name: "clump_size", .. })
        ));
    }

    #[test]
    fn test_rejects_key_too_long_for_node() {
        let options = FormatOptions {
            node_size: 512,
            clump_size: 512 * 8,
            ..FormatOptions::default()
        };
        let err = options.validate().expect_err("516-byte keys cannot fit");
        assert_eq!(
            err.to_string(),
            "invalid value for max_key_length: 516 does not fit a 512-byte node"
        );
    }

    #[test]
    fn test_rejects_too_few_nodes() {
        let options = FormatOptions {
            total_nodes: 0,
            ..FormatOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidValue { name: "total_nodes", .. })
        ));
    }

    #[test]
    fn test_config_from_json() {
        let options: FormatOptions =
            serde_json::from_str(r#"{"node_size": 512, "max_key_length": 10}"#).expect("parse");
        assert_eq!(options.node_size, 512);
        assert_eq!(options.max_key_length, 10);
        assert_eq!(options.total_nodes, FormatOptions::DEFAULT_TOTAL_NODES);

        let json = serde_json::to_string(&options).expect("serialize");
        let back: FormatOptions = serde_json::from_str(&json).expect("parse back");
        assert_eq!(back, options);
    }
}
