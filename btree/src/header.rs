//! The header record stored in node 0.
//!
//! Node 0 (the header node) holds three records:
//! - record 0: the 106-byte header record, right after the descriptor
//! - record 1: a 128-byte user data record, unused by the tree
//! - record 2: the first chunk of the free-space bitmap

use crate::node::DESCRIPTOR_SIZE;
use crate::store::{read_u16, read_u32, write_u16, write_u32};

/// Size of the header record in bytes.
pub const HEADER_RECORD_SIZE: usize = 106;

/// Size of the user data record in the header node.
pub const USER_DATA_SIZE: usize = 128;

/// Offset of the header record within node 0.
pub const HEADER_RECORD_OFFSET: usize = DESCRIPTOR_SIZE;

/// Offset of the bitmap record within node 0.
pub const HEADER_MAP_OFFSET: usize = HEADER_RECORD_OFFSET + HEADER_RECORD_SIZE + USER_DATA_SIZE;

/// Length of the bitmap record in the header node.
#[must_use]
pub const fn header_map_len(node_size: usize) -> usize {
    node_size - HEADER_MAP_OFFSET - 4 * 2
}

/// Length of the bitmap record in a map node.
#[must_use]
pub const fn map_node_len(node_size: usize) -> usize {
    node_size - DESCRIPTOR_SIZE - 3 * 2
}

/// `btree_type` of the catalog and extents trees.
pub const HFS_BTREE_TYPE: u8 = 0;
/// `btree_type` of user trees.
pub const USER_BTREE_TYPE: u8 = 128;

/// `key_compare_type`: case-insensitive catalog keys (HFSX only).
pub const CASE_FOLDING: u8 = 0xCF;
/// `key_compare_type`: binary catalog keys (HFSX only).
pub const BINARY_COMPARE: u8 = 0xBC;

/// Attribute bit: the tree was not closed cleanly.
pub const BAD_CLOSE_MASK: u32 = 0x0000_0001;
/// Attribute bit: key lengths are 16-bit.
pub const BIG_KEYS_MASK: u32 = 0x0000_0002;
/// Attribute bit: index keys are stored at their actual length.
pub const VARIABLE_INDEX_KEYS_MASK: u32 = 0x0000_0004;

/// The tree-wide header record.
///
/// Layout (big-endian):
/// - `tree_depth`: 2 bytes
/// - `root_node`: 4 bytes
/// - `leaf_records`: 4 bytes
/// - `first_leaf_node`: 4 bytes
/// - `last_leaf_node`: 4 bytes
/// - `node_size`: 2 bytes
/// - `max_key_length`: 2 bytes
/// - `total_nodes`: 4 bytes
/// - `free_nodes`: 4 bytes
/// - `reserved1`: 2 bytes
/// - `clump_size`: 4 bytes
/// - `btree_type`: 1 byte
/// - `key_compare_type`: 1 byte
/// - `attributes`: 4 bytes
/// - `reserved3`: 64 bytes
///
/// Total: 106 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    pub tree_depth: u16,
    pub root_node: u32,
    pub leaf_records: u32,
    pub first_leaf_node: u32,
    pub last_leaf_node: u32,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub reserved1: u16,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
    pub attributes: u32,
    pub reserved3: [u32; 16],
}

impl HeaderRecord {
    /// Serialize to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_RECORD_SIZE] {
        let mut bytes = [0u8; HEADER_RECORD_SIZE];
        write_u16(&mut bytes, 0, self.tree_depth);
        write_u32(&mut bytes, 2, self.root_node);
        write_u32(&mut bytes, 6, self.leaf_records);
        write_u32(&mut bytes, 10, self.first_leaf_node);
        write_u32(&mut bytes, 14, self.last_leaf_node);
        write_u16(&mut bytes, 18, self.node_size);
        write_u16(&mut bytes, 20, self.max_key_length);
        write_u32(&mut bytes, 22, self.total_nodes);
        write_u32(&mut bytes, 26, self.free_nodes);
        write_u16(&mut bytes, 30, self.reserved1);
        write_u32(&mut bytes, 32, self.clump_size);
        bytes[36] = self.btree_type;
        bytes[37] = self.key_compare_type;
        write_u32(&mut bytes, 38, self.attributes);
        for (i, word) in self.reserved3.iter().enumerate() {
            write_u32(&mut bytes, 42 + i * 4, *word);
        }
        bytes
    }

    /// Deserialize from the first 106 bytes of `bytes`.
    ///
    /// Returns `None` if the slice is too short.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_RECORD_SIZE {
            return None;
        }
        let mut reserved3 = [0u32; 16];
        for (i, word) in reserved3.iter_mut().enumerate() {
            *word = read_u32(bytes, 42 + i * 4);
        }

        Some(Self {
            tree_depth: read_u16(bytes, 0),
            root_node: read_u32(bytes, 2),
            leaf_records: read_u32(bytes, 6),
            first_leaf_node: read_u32(bytes, 10),
            last_leaf_node: read_u32(bytes, 14),
            node_size: read_u16(bytes, 18),
            max_key_length: read_u16(bytes, 20),
            total_nodes: read_u32(bytes, 22),
            free_nodes: read_u32(bytes, 26),
            reserved1: read_u16(bytes, 30),
            clump_size: read_u32(bytes, 32),
            btree_type: bytes[36],
            key_compare_type: bytes[37],
            attributes: read_u32(bytes, 38),
            reserved3,
        })
    }

    /// Whether the tree holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root_node == 0
    }
}
