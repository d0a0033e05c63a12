//! Node layout and record codec.
//!
//! Every node is a fixed `node_size`-byte page:
//!
//! ```text
//! +------------------+---------------------------+------------+--------------+
//! | descriptor (14)  | records, growing forward  | free space | offset table |
//! +------------------+---------------------------+------------+--------------+
//! ```
//!
//! The offset table grows backward from the end of the node. Entry `i` sits at
//! `node_size - 2 * (i + 1)` and holds the start of record `i`; entry
//! `num_records` marks where free space begins. All fields are big-endian.
//!
//! Keyed records (leaf and index nodes) are `[u16 key_length][key][data]`.
//! Index data is a 4-byte child node number.

#![allow(clippy::cast_possible_truncation)]

use crate::store::{read_u16, read_u32, write_u16, write_u32};

/// Size of the node descriptor at the start of every node.
pub const DESCRIPTOR_SIZE: usize = 14;

/// Smallest node size HFS+ allows.
pub const MIN_NODE_SIZE: usize = 512;

/// Largest node size HFS+ allows.
pub const MAX_NODE_SIZE: usize = 32768;

/// Size of the key length prefix in a keyed record.
pub const KEY_LENGTH_SIZE: usize = 2;

/// Size of an index record's child pointer.
pub const CHILD_POINTER_SIZE: usize = 4;

/// Largest keyed record (prefix, key and data) accepted for a node size.
///
/// Two records of this size plus their offset slots always fit in an empty
/// node, so a node holding one can still take another after a split.
#[must_use]
pub const fn max_record_size(node_size: usize) -> usize {
    (node_size - DESCRIPTOR_SIZE - 2) / 2 - 2
}

/// Node kind discriminant as stored in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Index,
    Header,
    Map,
}

impl NodeKind {
    /// On-disk byte (a signed `i8` in the HFS+ headers; leaf is -1).
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Leaf => 0xFF,
            Self::Index => 0,
            Self::Header => 1,
            Self::Map => 2,
        }
    }

    #[must_use]
    pub const fn is_keyed(self) -> bool {
        matches!(self, Self::Leaf | Self::Index)
    }
}

impl TryFrom<u8> for NodeKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xFF => Ok(Self::Leaf),
            0 => Ok(Self::Index),
            1 => Ok(Self::Header),
            2 => Ok(Self::Map),
            _ => Err(value),
        }
    }
}

/// The 14-byte descriptor at the start of every node.
///
/// Layout:
/// - `f_link`: 4 bytes, next node at the same height (0 if none)
/// - `b_link`: 4 bytes, previous node at the same height (0 if none)
/// - `kind`: 1 byte
/// - `height`: 1 byte (leaves are 1, header and map nodes 0)
/// - `num_records`: 2 bytes
/// - `reserved`: 2 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub f_link: u32,
    pub b_link: u32,
    pub kind: NodeKind,
    pub height: u8,
    pub num_records: u16,
    pub reserved: u16,
}

impl NodeDescriptor {
    /// Create an unlinked descriptor with no records.
    #[must_use]
    pub const fn new(kind: NodeKind, height: u8) -> Self {
        Self {
            f_link: 0,
            b_link: 0,
            kind,
            height,
            num_records: 0,
            reserved: 0,
        }
    }

    /// Serialize to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        write_u32(&mut bytes, 0, self.f_link);
        write_u32(&mut bytes, 4, self.b_link);
        bytes[8] = self.kind.to_byte();
        bytes[9] = self.height;
        write_u16(&mut bytes, 10, self.num_records);
        write_u16(&mut bytes, 12, self.reserved);
        bytes
    }

    /// Deserialize from the first 14 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NodeError> {
        if bytes.len() < DESCRIPTOR_SIZE {
            return Err(NodeError::Truncated { len: bytes.len() });
        }
        let kind = NodeKind::try_from(bytes[8]).map_err(NodeError::InvalidKind)?;

        Ok(Self {
            f_link: read_u32(bytes, 0),
            b_link: read_u32(bytes, 4),
            kind,
            height: bytes[9],
            num_records: read_u16(bytes, 10),
            reserved: read_u16(bytes, 12),
        })
    }
}

/// Build a keyed record from a key body and its data.
#[must_use]
pub fn encode_record(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(KEY_LENGTH_SIZE + key.len() + data.len());
    record.extend_from_slice(&(key.len() as u16).to_be_bytes());
    record.extend_from_slice(key);
    record.extend_from_slice(data);
    record
}

/// Build an index record pointing at `child`.
#[must_use]
pub fn index_record(key: &[u8], child: u32) -> Vec<u8> {
    encode_record(key, &child.to_be_bytes())
}

/// An in-memory copy of one node.
#[derive(Debug, Clone)]
pub struct Node {
    number: u32,
    bytes: Vec<u8>,
}

impl Node {
    /// Create an empty node with the given descriptor.
    ///
    /// The descriptor's record count is ignored; the node starts empty.
    #[must_use]
    pub fn new(number: u32, node_size: usize, descriptor: &NodeDescriptor) -> Self {
        let mut node = Self {
            number,
            bytes: vec![0; node_size],
        };
        node.set_descriptor(&NodeDescriptor {
            num_records: 0,
            ..*descriptor
        });
        node.set_offset(0, DESCRIPTOR_SIZE);
        node
    }

    /// Wrap raw node bytes read from a store.
    #[must_use]
    pub const fn from_bytes(number: u32, bytes: Vec<u8>) -> Self {
        Self { number, bytes }
    }

    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn descriptor(&self) -> Result<NodeDescriptor, NodeError> {
        NodeDescriptor::from_bytes(&self.bytes)
    }

    pub fn set_descriptor(&mut self, descriptor: &NodeDescriptor) {
        self.bytes[..DESCRIPTOR_SIZE].copy_from_slice(&descriptor.to_bytes());
    }

    /// Record count straight from the descriptor bytes.
    #[must_use]
    pub fn num_records(&self) -> usize {
        usize::from(read_u16(&self.bytes, 10))
    }

    fn set_num_records(&mut self, count: usize) {
        write_u16(&mut self.bytes, 10, count as u16);
    }

    /// Position of offset-table entry `index`, if it lies past the descriptor.
    fn slot(&self, index: usize) -> Option<usize> {
        let back = 2 * (index + 1);
        self.bytes
            .len()
            .checked_sub(back)
            .filter(|&slot| slot >= DESCRIPTOR_SIZE)
    }

    /// Raw offset-table entry `index`.
    #[must_use]
    pub fn offset(&self, index: usize) -> Option<usize> {
        self.slot(index)
            .map(|slot| usize::from(read_u16(&self.bytes, slot)))
    }

    fn set_offset(&mut self, index: usize, value: usize) {
        if let Some(slot) = self.slot(index) {
            write_u16(&mut self.bytes, slot, value as u16);
        }
    }

    /// Start of the offset table for the current record count.
    #[must_use]
    pub fn table_start(&self) -> usize {
        self.slot(self.num_records()).unwrap_or(DESCRIPTOR_SIZE)
    }

    /// Bytes available between the record area and the offset table.
    #[must_use]
    pub fn free_space(&self) -> usize {
        let table_start = self.table_start();
        let boundary = self.offset(self.num_records()).unwrap_or(table_start);
        table_start.saturating_sub(boundary)
    }

    /// Check the offset table and key lengths against the node bounds.
    pub fn validate(&self) -> Result<(), NodeError> {
        let descriptor = self.descriptor()?;
        let count = usize::from(descriptor.num_records);
        let table_start = self
            .slot(count)
            .ok_or(NodeError::TooManyRecords { count })?;

        let mut previous = DESCRIPTOR_SIZE;
        for index in 0..=count {
            let offset = self.offset(index).unwrap_or(0);
            if offset < previous || offset > table_start {
                return Err(NodeError::BadOffset { index, offset });
            }
            previous = offset;
        }

        if descriptor.kind.is_keyed() {
            for index in 0..count {
                self.key(index)?;
            }
        }
        Ok(())
    }

    fn bounds(&self, index: usize) -> Result<(usize, usize), NodeError> {
        let count = self.num_records();
        if index >= count {
            return Err(NodeError::RecordIndex { index, count });
        }
        let start = self.offset(index).unwrap_or(0);
        let end = self.offset(index + 1).unwrap_or(0);
        if start < DESCRIPTOR_SIZE || end < start || end > self.table_start() {
            return Err(NodeError::BadOffset {
                index,
                offset: start,
            });
        }
        Ok((start, end))
    }

    /// Raw bytes of record `index`.
    pub fn record(&self, index: usize) -> Result<&[u8], NodeError> {
        let (start, end) = self.bounds(index)?;
        Ok(&self.bytes[start..end])
    }

    /// Split record `index` into its key body and data.
    fn key_and_data(&self, index: usize) -> Result<(&[u8], &[u8]), NodeError> {
        let record = self.record(index)?;
        if record.len() < KEY_LENGTH_SIZE {
            return Err(NodeError::BadKeyLength {
                index,
                key_length: 0,
                record_length: record.len(),
            });
        }
        let key_length = usize::from(read_u16(record, 0));
        let data_start = KEY_LENGTH_SIZE + key_length;
        if data_start > record.len() {
            return Err(NodeError::BadKeyLength {
                index,
                key_length,
                record_length: record.len(),
            });
        }
        Ok((&record[KEY_LENGTH_SIZE..data_start], &record[data_start..]))
    }

    /// Key body of record `index`, without the length prefix.
    pub fn key(&self, index: usize) -> Result<&[u8], NodeError> {
        self.key_and_data(index).map(|(key, _)| key)
    }

    /// Data of record `index`.
    pub fn data(&self, index: usize) -> Result<&[u8], NodeError> {
        self.key_and_data(index).map(|(_, data)| data)
    }

    /// Child pointer of index record `index`.
    pub fn child(&self, index: usize) -> Result<u32, NodeError> {
        let data = self.data(index)?;
        if data.len() < CHILD_POINTER_SIZE {
            return Err(NodeError::BadChildPointer { index });
        }
        Ok(read_u32(data, 0))
    }

    /// Insert `record` so that it becomes record `index`.
    ///
    /// Later records and their offset entries shift forward.
    pub fn insert_record(&mut self, index: usize, record: &[u8]) -> Result<(), NodeError> {
        let count = self.num_records();
        if index > count {
            return Err(NodeError::RecordIndex { index, count });
        }
        let needed = record.len() + 2;
        let available = self.free_space();
        if available < needed {
            return Err(NodeError::NoSpace { needed, available });
        }

        let len = record.len();
        let start = self.offset(index).unwrap_or(DESCRIPTOR_SIZE);
        let boundary = self.offset(count).unwrap_or(start);
        self.bytes.copy_within(start..boundary, start + len);
        self.bytes[start..start + len].copy_from_slice(record);

        for j in (index..=count).rev() {
            let moved = self.offset(j).unwrap_or(start) + len;
            self.set_offset(j + 1, moved);
        }
        self.set_offset(index, start);
        self.set_num_records(count + 1);
        Ok(())
    }

    /// Remove record `index`, returning its bytes.
    ///
    /// Later records and their offset entries shift backward.
    pub fn remove_record(&mut self, index: usize) -> Result<Vec<u8>, NodeError> {
        let (start, end) = self.bounds(index)?;
        let count = self.num_records();
        let len = end - start;
        let removed = self.bytes[start..end].to_vec();

        let boundary = self.offset(count).unwrap_or(end);
        self.bytes.copy_within(end..boundary, start);
        self.bytes[boundary - len..boundary].fill(0);

        for j in index + 1..=count {
            let moved = self.offset(j).unwrap_or(end) - len;
            self.set_offset(j - 1, moved);
        }
        self.set_offset(count, 0);
        self.set_num_records(count - 1);
        Ok(removed)
    }

    /// Replace record `index` with `record`, which may differ in length.
    pub fn replace_record(&mut self, index: usize, record: &[u8]) -> Result<(), NodeError> {
        let old_len = self.record(index)?.len();
        let available = self.free_space() + old_len;
        if record.len() > available {
            return Err(NodeError::NoSpace {
                needed: record.len() - old_len,
                available: self.free_space(),
            });
        }
        self.remove_record(index)?;
        self.insert_record(index, record)
    }

    /// Whether `record` could replace record `index` in place.
    #[must_use]
    pub fn can_replace(&self, index: usize, record: &[u8]) -> bool {
        self.record(index)
            .is_ok_and(|old| record.len() <= old.len() + self.free_space())
    }

    /// Remove records `at..` and return them in order.
    pub fn split_off(&mut self, at: usize) -> Result<Vec<Vec<u8>>, NodeError> {
        let count = self.num_records();
        if at > count {
            return Err(NodeError::RecordIndex { index: at, count });
        }
        let moved = (at..count)
            .map(|index| self.record(index).map(<[u8]>::to_vec))
            .collect::<Result<Vec<_>, _>>()?;

        let boundary = self.offset(at).unwrap_or(DESCRIPTOR_SIZE);
        let end = self.offset(count).unwrap_or(boundary);
        self.bytes[boundary..end].fill(0);
        for j in at + 1..=count {
            self.set_offset(j, 0);
        }
        self.set_num_records(at);
        Ok(moved)
    }
}

/// Errors found while decoding or editing a node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("node buffer of {len} bytes is shorter than a descriptor")]
    Truncated { len: usize },
    #[error("invalid node kind {0:#04x}")]
    InvalidKind(u8),
    #[error("{count} records do not fit in the offset table")]
    TooManyRecords { count: usize },
    #[error("offset table entry {index} ({offset}) is out of order or out of bounds")]
    BadOffset { index: usize, offset: usize },
    #[error("record {index} has key length {key_length} but is only {record_length} bytes")]
    BadKeyLength {
        index: usize,
        key_length: usize,
        record_length: usize,
    },
    #[error("record {index} is too short to hold a child pointer")]
    BadChildPointer { index: usize },
    #[error("record index {index} out of range ({count} records)")]
    RecordIndex { index: usize, count: usize },
    #[error("need {needed} bytes but only {available} are free")]
    NoSpace { needed: usize, available: usize },
}
