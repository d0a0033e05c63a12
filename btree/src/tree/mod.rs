//! B-tree operations over a [`Store`].
//!
//! The tree keeps an in-memory copy of the header record and rewrites it
//! after every structural step. Nodes are read into owned [`Node`] buffers,
//! edited, and written back whole; nothing is cached between calls.
//!
//! # Structure
//!
//! - Leaves (height 1) hold `(key, data)` records and form a doubly-linked
//!   chain from `first_leaf_node` to `last_leaf_node`.
//! - Index nodes hold one record per child: the child's first key and its
//!   node number. Every level is linked the same way.
//! - The root's height equals the header's `tree_depth`.

#![allow(clippy::cast_possible_truncation)]

mod alloc;
mod check;
mod cursor;
mod insert;
mod remove;

use std::cmp::Ordering;

use crate::config::ConfigError;
use crate::header::{HEADER_RECORD_OFFSET, HEADER_RECORD_SIZE, HeaderRecord};
use crate::keys::{KeyError, KeyOps};
use crate::node::{DESCRIPTOR_SIZE, MAX_NODE_SIZE, MIN_NODE_SIZE, Node, NodeDescriptor, NodeError, NodeKind};
use crate::store::{Store, StoreError, read_u16, read_u32};

pub use check::{CheckError, Report};
pub use cursor::Cursor;

/// Upper bound on whole-operation retries after a pre-emptive split.
///
/// Each retry follows a split of one index node, so a handful is plenty.
const MAX_RETRIES: usize = 64;

/// Errors from tree operations.
#[derive(Debug, thiserror::Error)]
pub enum BTreeError {
    /// The backing store failed.
    #[error("I/O error: {0}")]
    Io(#[from] StoreError),
    /// A node's bytes do not decode.
    #[error("node {node}: {source}")]
    Node {
        node: u32,
        #[source]
        source: NodeError,
    },
    /// A tree invariant does not hold and cannot be repaired locally.
    #[error("consistency fault: {0}")]
    ConsistencyFault(String),
    /// A stored key or data blob does not decode.
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("invalid format options: {0}")]
    Config(#[from] ConfigError),
    #[error("key already exists")]
    AlreadyExists,
    #[error("key not found")]
    NotFound,
    #[error("key of {len} bytes exceeds the maximum of {max}")]
    KeyTooLong { len: usize, max: usize },
    #[error("record of {len} bytes exceeds the maximum of {max}")]
    RecordTooLarge { len: usize, max: usize },
}

impl BTreeError {
    /// Whether the error leaves the tree in an unknown state.
    ///
    /// Fatal errors may strike mid-mutation; the tree should be checked
    /// before further use.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Node { .. } | Self::ConsistencyFault(_) | Self::Key(_)
        )
    }
}

/// Attach a node number to node codec errors.
pub(crate) trait NodeContext<T> {
    fn at(self, node: u32) -> Result<T, BTreeError>;
}

impl<T> NodeContext<T> for Result<T, NodeError> {
    fn at(self, node: u32) -> Result<T, BTreeError> {
        self.map_err(|source| BTreeError::Node { node, source })
    }
}

/// Result of a successful search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit<D> {
    /// Data of the matching record, or of the floor record if inexact.
    pub data: D,
    /// Leaf holding the record.
    pub node: u32,
    /// Index of the record within the leaf.
    pub record: usize,
    /// Whether the record's key equals the search key.
    pub exact: bool,
}

/// What a recursive insert or remove step asks of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    /// The node split; the caller must link in the new sibling.
    SplitPropagated(u32),
    /// An index node was split ahead of a separator rewrite. The sibling,
    /// if still unlinked, must be linked in before the operation restarts.
    RetryWholeOperation(Option<u32>),
}

impl Outcome {
    /// Carry a retry signal from below through this level's outcome.
    pub(crate) const fn retried(self) -> Self {
        match self {
            Self::Done => Self::RetryWholeOperation(None),
            Self::SplitPropagated(node) => Self::RetryWholeOperation(Some(node)),
            Self::RetryWholeOperation(node) => Self::RetryWholeOperation(node),
        }
    }
}

/// Where a key falls within a node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Position {
    /// First record whose key is not less than the target.
    pub index: usize,
    /// Whether that record's key equals the target.
    pub exact: bool,
}

impl Position {
    /// Record with the largest key not greater than the target.
    pub(crate) const fn floor(self) -> Option<usize> {
        if self.exact {
            Some(self.index)
        } else if self.index == 0 {
            None
        } else {
            Some(self.index - 1)
        }
    }
}

/// A B-tree stored in a [`Store`].
///
/// The tree borrows the store exclusively; callers serialize all operations
/// simply by holding the tree.
pub struct BTree<'a, S: Store, K: KeyOps> {
    store: &'a mut S,
    keys: K,
    header: HeaderRecord,
}

impl<'a, S: Store, K: KeyOps> BTree<'a, S, K> {
    /// Open the tree whose header node is node 0 of `store`.
    pub fn open(store: &'a mut S, keys: K) -> Result<Self, BTreeError> {
        let mut bytes = [0u8; DESCRIPTOR_SIZE + HEADER_RECORD_SIZE];
        store.read(0, &mut bytes)?;

        let descriptor = NodeDescriptor::from_bytes(&bytes).at(0)?;
        if descriptor.kind != NodeKind::Header {
            return Err(BTreeError::ConsistencyFault(format!(
                "node 0 is a {:?} node, not the header node",
                descriptor.kind
            )));
        }
        let header = HeaderRecord::from_bytes(&bytes[HEADER_RECORD_OFFSET..]).ok_or_else(|| {
            BTreeError::ConsistencyFault("header record is truncated".to_string())
        })?;

        let node_size = usize::from(header.node_size);
        if !node_size.is_power_of_two() || !(MIN_NODE_SIZE..=MAX_NODE_SIZE).contains(&node_size) {
            return Err(BTreeError::ConsistencyFault(format!(
                "invalid node size {node_size}"
            )));
        }
        let needed = u64::from(header.total_nodes) * node_size as u64;
        if store.size() < needed {
            return Err(BTreeError::ConsistencyFault(format!(
                "store holds {} bytes but the tree claims {needed}",
                store.size()
            )));
        }

        tracing::debug!(
            root = header.root_node,
            depth = header.tree_depth,
            total_nodes = header.total_nodes,
            free_nodes = header.free_nodes,
            "opened b-tree"
        );
        Ok(Self {
            store,
            keys,
            header,
        })
    }

    /// Persist the header and flush the store.
    pub fn close(mut self) -> Result<(), BTreeError> {
        self.persist_header()?;
        self.store.sync()?;
        tracing::debug!(leaf_records = self.header.leaf_records, "closed b-tree");
        Ok(())
    }

    /// The in-memory header record.
    #[must_use]
    pub const fn header(&self) -> &HeaderRecord {
        &self.header
    }

    #[must_use]
    pub const fn key_ops(&self) -> &K {
        &self.keys
    }

    #[must_use]
    pub fn node_size(&self) -> usize {
        usize::from(self.header.node_size)
    }

    fn node_offset(&self, node: u32) -> u64 {
        u64::from(node) * self.node_size() as u64
    }

    fn check_node_number(&self, node: u32) -> Result<(), BTreeError> {
        if node >= self.header.total_nodes {
            return Err(BTreeError::ConsistencyFault(format!(
                "node {node} is beyond the {} nodes of the tree",
                self.header.total_nodes
            )));
        }
        Ok(())
    }

    /// Read the descriptor of `node`.
    pub fn read_descriptor(&mut self, node: u32) -> Result<NodeDescriptor, BTreeError> {
        self.check_node_number(node)?;
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        self.store.read(self.node_offset(node), &mut bytes)?;
        NodeDescriptor::from_bytes(&bytes).at(node)
    }

    /// Overwrite the descriptor of `node`.
    pub fn write_descriptor(
        &mut self,
        node: u32,
        descriptor: &NodeDescriptor,
    ) -> Result<(), BTreeError> {
        self.check_node_number(node)?;
        self.store
            .write(self.node_offset(node), &descriptor.to_bytes())?;
        Ok(())
    }

    /// Re-read the header record from node 0, replacing the in-memory copy.
    pub fn read_header(&mut self) -> Result<HeaderRecord, BTreeError> {
        let mut bytes = [0u8; HEADER_RECORD_SIZE];
        self.store.read(HEADER_RECORD_OFFSET as u64, &mut bytes)?;
        let header = HeaderRecord::from_bytes(&bytes).ok_or_else(|| {
            BTreeError::ConsistencyFault("header record is truncated".to_string())
        })?;
        self.header = header;
        Ok(header)
    }

    /// Replace the header record and write it to node 0.
    pub fn write_header(&mut self, header: HeaderRecord) -> Result<(), BTreeError> {
        self.header = header;
        self.persist_header()
    }

    pub(crate) fn persist_header(&mut self) -> Result<(), BTreeError> {
        self.store
            .write(HEADER_RECORD_OFFSET as u64, &self.header.to_bytes())?;
        Ok(())
    }

    /// Absolute store offset of record `index` in `node`.
    pub fn record_offset(&mut self, node: u32, index: usize) -> Result<u64, BTreeError> {
        self.check_node_number(node)?;
        let node_size = self.node_size();
        let back = 2 * (index + 1);
        if back + DESCRIPTOR_SIZE > node_size {
            return Err(BTreeError::Node {
                node,
                source: NodeError::TooManyRecords { count: index },
            });
        }
        let slot = self.node_offset(node) + (node_size - back) as u64;
        let mut bytes = [0u8; 2];
        self.store.read(slot, &mut bytes)?;
        Ok(self.node_offset(node) + u64::from(read_u16(&bytes, 0)))
    }

    /// Free bytes between the record area and the offset table of `node`.
    pub fn free_space(&mut self, node: u32) -> Result<usize, BTreeError> {
        Ok(self.load_node(node)?.free_space())
    }

    /// Read the child pointer stored at absolute offset `data_offset`.
    pub fn child_of(&mut self, data_offset: u64) -> Result<u32, BTreeError> {
        let mut bytes = [0u8; 4];
        self.store.read(data_offset, &mut bytes)?;
        Ok(read_u32(&bytes, 0))
    }

    /// Read `node` without checking its layout.
    pub(crate) fn load_node_raw(&mut self, node: u32) -> Result<Node, BTreeError> {
        self.check_node_number(node)?;
        let mut bytes = vec![0u8; self.node_size()];
        self.store.read(self.node_offset(node), &mut bytes)?;
        Ok(Node::from_bytes(node, bytes))
    }

    /// Read `node` and validate its offset table.
    pub(crate) fn load_node(&mut self, node: u32) -> Result<Node, BTreeError> {
        let loaded = self.load_node_raw(node)?;
        loaded.validate().at(node)?;
        Ok(loaded)
    }

    pub(crate) fn store_node(&mut self, node: &Node) -> Result<(), BTreeError> {
        self.check_node_number(node.number())?;
        self.store
            .write(self.node_offset(node.number()), node.as_bytes())?;
        Ok(())
    }

    /// Load a node that must be a leaf or index node with records.
    pub(crate) fn load_tree_node(&mut self, number: u32) -> Result<(Node, NodeDescriptor), BTreeError> {
        let node = self.load_node(number)?;
        let descriptor = node.descriptor().at(number)?;
        if !descriptor.kind.is_keyed() {
            return Err(BTreeError::ConsistencyFault(format!(
                "node {number} is a {:?} node inside the tree",
                descriptor.kind
            )));
        }
        if descriptor.num_records == 0 {
            return Err(BTreeError::ConsistencyFault(format!(
                "node {number} has no records"
            )));
        }
        Ok((node, descriptor))
    }

    /// Find where `key` falls in `node` by ascending scan.
    pub(crate) fn locate(&self, node: &Node, key: &K::Key) -> Result<Position, BTreeError> {
        for index in 0..node.num_records() {
            let stored = self.keys.read_key(node.key(index).at(node.number())?)?;
            match self.keys.compare(&stored, key) {
                Ordering::Less => {}
                Ordering::Equal => return Ok(Position { index, exact: true }),
                Ordering::Greater => {
                    return Ok(Position {
                        index,
                        exact: false,
                    });
                }
            }
        }
        Ok(Position {
            index: node.num_records(),
            exact: false,
        })
    }

    /// Key body of the first record of `node`.
    pub(crate) fn first_key(&mut self, node: u32) -> Result<Vec<u8>, BTreeError> {
        let (loaded, _) = self.load_tree_node(node)?;
        Ok(loaded.key(0).at(node)?.to_vec())
    }

    /// Find `key`, or the record just below it.
    ///
    /// Returns the exact match if there is one, otherwise the floor record
    /// (largest key below `key`) with `exact == false`. An empty tree gives
    /// `None`. A key below every key in the tree has no floor, which is a
    /// `ConsistencyFault` at any level.
    pub fn search(&mut self, key: &K::Key) -> Result<Option<SearchHit<K::Data>>, BTreeError> {
        let mut number = self.header.root_node;
        if number == 0 {
            return Ok(None);
        }

        for _ in 0..=self.header.tree_depth {
            let (node, descriptor) = self.load_tree_node(number)?;
            let position = self.locate(&node, key)?;
            let Some(record) = position.floor() else {
                return Err(BTreeError::ConsistencyFault(format!(
                    "node {number} has no record at or below the search key"
                )));
            };

            if descriptor.kind == NodeKind::Leaf {
                let data = self.keys.read_data(node.data(record).at(number)?)?;
                return Ok(Some(SearchHit {
                    data,
                    node: number,
                    record,
                    exact: position.exact,
                }));
            }

            let child = node.child(record).at(number)?;
            tracing::trace!(node = number, record, child, "descending");
            number = child;
        }

        Err(BTreeError::ConsistencyFault(format!(
            "search did not reach a leaf within {} levels",
            self.header.tree_depth
        )))
    }
}
