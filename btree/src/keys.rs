//! Key capabilities injected into a tree.
//!
//! The tree never interprets key or data bytes itself. A [`KeyOps`]
//! implementation decodes, encodes, orders and prints keys for one kind of
//! tree (catalog, extents, attributes, ...).

use std::cmp::Ordering;
use std::fmt;

use crate::store::{read_u32, write_u32};

/// Errors from decoding a key or data blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("invalid key: {0}")]
    Invalid(String),
}

/// Comparison and serialization callbacks for one kind of tree.
///
/// `read_key` receives the key body without its 16-bit length prefix, and
/// `write_key` produces the body; the tree handles the prefix.
pub trait KeyOps {
    type Key: fmt::Debug;
    type Data;

    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering;

    fn read_key(&self, bytes: &[u8]) -> Result<Self::Key, KeyError>;

    fn write_key(&self, key: &Self::Key) -> Vec<u8>;

    fn read_data(&self, bytes: &[u8]) -> Result<Self::Data, KeyError>;

    /// Human-readable form of a key, for checker output.
    fn print_key(&self, key: &Self::Key) -> String {
        format!("{key:?}")
    }
}

/// Keys and data as raw bytes, ordered lexicographically.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseKeys;

impl KeyOps for BytewiseKeys {
    type Key = Vec<u8>;
    type Data = Vec<u8>;

    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering {
        a.cmp(b)
    }

    fn read_key(&self, bytes: &[u8]) -> Result<Self::Key, KeyError> {
        Ok(bytes.to_vec())
    }

    fn write_key(&self, key: &Self::Key) -> Vec<u8> {
        key.clone()
    }

    fn read_data(&self, bytes: &[u8]) -> Result<Self::Data, KeyError> {
        Ok(bytes.to_vec())
    }

    fn print_key(&self, key: &Self::Key) -> String {
        key.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Fork type of the data fork.
pub const DATA_FORK: u8 = 0x00;
/// Fork type of the resource fork.
pub const RESOURCE_FORK: u8 = 0xFF;

/// Length of an extents key body.
pub const EXTENT_KEY_LENGTH: usize = 10;

/// Number of extent descriptors in one extent record.
pub const EXTENTS_PER_RECORD: usize = 8;

/// Size of an extent record in bytes.
pub const EXTENT_RECORD_SIZE: usize = EXTENTS_PER_RECORD * 8;

/// Key of the extents overflow tree.
///
/// Body layout: `fork_type:u8, pad:u8, file_id:u32, start_block:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentKey {
    pub fork_type: u8,
    pub file_id: u32,
    pub start_block: u32,
}

/// A contiguous run of allocation blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtentDescriptor {
    pub start_block: u32,
    pub block_count: u32,
}

/// The eight extents following those in a fork's catalog record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtentRecord(pub [ExtentDescriptor; EXTENTS_PER_RECORD]);

impl ExtentRecord {
    /// Serialize to the 64-byte on-disk form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; EXTENT_RECORD_SIZE] {
        let mut bytes = [0u8; EXTENT_RECORD_SIZE];
        for (i, extent) in self.0.iter().enumerate() {
            write_u32(&mut bytes, i * 8, extent.start_block);
            write_u32(&mut bytes, i * 8 + 4, extent.block_count);
        }
        bytes
    }

    /// Total blocks covered by the record.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.0.iter().map(|e| u64::from(e.block_count)).sum()
    }
}

/// Key capabilities of the HFS+ extents overflow tree.
///
/// Keys order by file ID, then fork type, then starting file block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtentKeys;

impl KeyOps for ExtentKeys {
    type Key = ExtentKey;
    type Data = ExtentRecord;

    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering {
        a.file_id
            .cmp(&b.file_id)
            .then(a.fork_type.cmp(&b.fork_type))
            .then(a.start_block.cmp(&b.start_block))
    }

    fn read_key(&self, bytes: &[u8]) -> Result<Self::Key, KeyError> {
        if bytes.len() < EXTENT_KEY_LENGTH {
            return Err(KeyError::Truncated {
                expected: EXTENT_KEY_LENGTH,
                actual: bytes.len(),
            });
        }
        Ok(ExtentKey {
            fork_type: bytes[0],
            file_id: read_u32(bytes, 2),
            start_block: read_u32(bytes, 6),
        })
    }

    fn write_key(&self, key: &Self::Key) -> Vec<u8> {
        let mut bytes = vec![0u8; EXTENT_KEY_LENGTH];
        bytes[0] = key.fork_type;
        write_u32(&mut bytes, 2, key.file_id);
        write_u32(&mut bytes, 6, key.start_block);
        bytes
    }

    fn read_data(&self, bytes: &[u8]) -> Result<Self::Data, KeyError> {
        if bytes.len() < EXTENT_RECORD_SIZE {
            return Err(KeyError::Truncated {
                expected: EXTENT_RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        let mut record = ExtentRecord::default();
        for (i, extent) in record.0.iter_mut().enumerate() {
            extent.start_block = read_u32(bytes, i * 8);
            extent.block_count = read_u32(bytes, i * 8 + 4);
        }
        Ok(record)
    }

    fn print_key(&self, key: &Self::Key) -> String {
        let fork = if key.fork_type == RESOURCE_FORK {
            "rsrc"
        } else {
            "data"
        };
        format!("{}:{fork}:{}", key.file_id, key.start_block)
    }
}
