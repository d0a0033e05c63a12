//! Free-space allocator.
//!
//! One bit per node number, most significant bit first: node `n` is bit
//! `0x80 >> (n % 8)` of byte `n / 8`. A set bit means the node is in use.
//! The bitmap starts in record 2 of the header node and continues in map
//! nodes chained through `f_link`.

#![allow(clippy::cast_possible_truncation)]

use crate::header::map_node_len;
use crate::keys::KeyOps;
use crate::node::{DESCRIPTOR_SIZE, Node, NodeDescriptor, NodeKind};
use crate::store::Store;

use super::{BTree, BTreeError, NodeContext};

/// Record index of the bitmap within the header node.
const HEADER_MAP_RECORD: usize = 2;

/// One contiguous chunk of the bitmap.
#[derive(Debug)]
pub(crate) struct MapSegment {
    /// Node holding the chunk (0 for the header node).
    pub node: u32,
    /// Absolute store offset of the chunk's first byte.
    pub start: u64,
    pub bits: Vec<u8>,
    /// Node number described by the chunk's first bit.
    pub first_bit: u64,
}

impl MapSegment {
    pub(crate) fn bit_count(&self) -> u64 {
        self.bits.len() as u64 * 8
    }

    fn covers(&self, node: u64) -> bool {
        node >= self.first_bit && node < self.first_bit + self.bit_count()
    }
}

/// Whether `node` is marked in use within `bitmap` (bit 0 = node 0).
pub(crate) fn bit_is_set(bitmap: &[u8], node: u64) -> bool {
    let byte = (node / 8) as usize;
    bitmap
        .get(byte)
        .is_some_and(|b| b & (0x80 >> (node % 8)) != 0)
}

impl<S: Store, K: KeyOps> BTree<'_, S, K> {
    /// Read every bitmap chunk, following the map node chain.
    pub(crate) fn map_segments(&mut self) -> Result<Vec<MapSegment>, BTreeError> {
        let header_node = self.load_node(0)?;
        let bits = header_node.record(HEADER_MAP_RECORD).at(0)?.to_vec();
        let start = header_node.offset(HEADER_MAP_RECORD).unwrap_or(0) as u64;
        let mut first_bit = bits.len() as u64 * 8;
        let mut segments = vec![MapSegment {
            node: 0,
            start,
            bits,
            first_bit: 0,
        }];

        let mut next = header_node.descriptor().at(0)?.f_link;
        while next != 0 {
            if segments.len() > self.header.total_nodes as usize {
                return Err(BTreeError::ConsistencyFault(
                    "map node chain loops".to_string(),
                ));
            }
            let map = self.load_node(next)?;
            let descriptor = map.descriptor().at(next)?;
            if descriptor.kind != NodeKind::Map {
                return Err(BTreeError::ConsistencyFault(format!(
                    "node {next} in the map chain is a {:?} node",
                    descriptor.kind
                )));
            }
            let bits = map.record(0).at(next)?.to_vec();
            let start = self.node_offset(next) + map.offset(0).unwrap_or(DESCRIPTOR_SIZE) as u64;
            let segment = MapSegment {
                node: next,
                start,
                first_bit,
                bits,
            };
            first_bit += segment.bit_count();
            segments.push(segment);
            next = descriptor.f_link;
        }
        Ok(segments)
    }

    fn set_allocated(&mut self, node: u32, used: bool) -> Result<(), BTreeError> {
        let segments = self.map_segments()?;
        let bit = u64::from(node);
        let segment = segments.iter().find(|s| s.covers(bit)).ok_or_else(|| {
            BTreeError::ConsistencyFault(format!("node {node} is not covered by the bitmap"))
        })?;

        let relative = bit - segment.first_bit;
        let index = (relative / 8) as usize;
        let mask = 0x80u8 >> (relative % 8);
        let byte = if used {
            segment.bits[index] | mask
        } else {
            segment.bits[index] & !mask
        };
        self.store.write(segment.start + index as u64, &[byte])?;
        Ok(())
    }

    /// Mark `node` as in use without touching `free_nodes`.
    pub fn mark_used(&mut self, node: u32) -> Result<(), BTreeError> {
        self.set_allocated(node, true)
    }

    /// Whether the bitmap marks `node` as in use.
    pub fn is_allocated(&mut self, node: u32) -> Result<bool, BTreeError> {
        let segments = self.map_segments()?;
        let bit = u64::from(node);
        Ok(segments
            .iter()
            .find(|s| s.covers(bit))
            .is_some_and(|s| bit_is_set(&s.bits, bit - s.first_bit)))
    }

    /// Claim the lowest free node.
    ///
    /// Marks its bit, decrements `free_nodes` and persists the header.
    pub fn find_free(&mut self) -> Result<u32, BTreeError> {
        let total = u64::from(self.header.total_nodes);
        let segments = self.map_segments()?;

        for segment in &segments {
            for (index, byte) in segment.bits.iter().enumerate() {
                if *byte == 0xFF {
                    continue;
                }
                let bit = (0..8u64).find(|bit| byte & (0x80 >> bit) == 0).unwrap_or(0);
                let node = segment.first_bit + index as u64 * 8 + bit;
                if node >= total {
                    break;
                }

                let claimed = byte | (0x80 >> bit);
                self.store.write(segment.start + index as u64, &[claimed])?;
                self.header.free_nodes = self.header.free_nodes.saturating_sub(1);
                self.persist_header()?;
                return Ok(node as u32);
            }
        }

        Err(BTreeError::ConsistencyFault(format!(
            "bitmap has no free node among {total}"
        )))
    }

    /// Grow the store by one clump and extend the bitmap to cover it.
    ///
    /// Returns the number of nodes added. New map nodes, if any, are taken
    /// from the start of the new range and marked used.
    pub fn grow(&mut self) -> Result<u32, BTreeError> {
        let node_size = self.node_size();
        let old_total = self.header.total_nodes;
        let requested =
            u64::from(old_total) * node_size as u64 + u64::from(self.header.clump_size);
        let new_size = self.store.allocate_more(requested)?.min(requested);
        let new_total = u32::try_from(new_size / node_size as u64).unwrap_or(u32::MAX);
        if new_total <= old_total {
            return Err(BTreeError::ConsistencyFault(format!(
                "store cannot grow past {old_total} nodes"
            )));
        }

        let added = new_total - old_total;
        self.header.total_nodes = new_total;
        self.header.free_nodes += added;
        self.persist_header()?;

        let mut segments = self.map_segments()?;
        let mut covered: u64 = segments.iter().map(MapSegment::bit_count).sum();
        let mut candidate = old_total;
        while covered < u64::from(new_total) {
            let number = candidate;
            candidate += 1;

            let mut map = Node::new(number, node_size, &NodeDescriptor::new(NodeKind::Map, 0));
            map.insert_record(0, &vec![0u8; map_node_len(node_size)])
                .at(number)?;
            self.store_node(&map)?;

            let last = segments.last().map_or(0, |s| s.node);
            let mut previous = self.read_descriptor(last)?;
            previous.f_link = number;
            self.write_descriptor(last, &previous)?;

            let segment = MapSegment {
                node: number,
                start: self.node_offset(number) + DESCRIPTOR_SIZE as u64,
                bits: vec![0u8; map_node_len(node_size)],
                first_bit: covered,
            };
            covered += segment.bit_count();
            segments.push(segment);

            self.mark_used(number)?;
            self.header.free_nodes -= 1;
            self.persist_header()?;
            tracing::debug!(node = number, covered, "appended map node");
        }

        tracing::debug!(old_total, new_total, "grew b-tree");
        Ok(added)
    }

    /// Allocate a node, growing the store first if none are free.
    pub(crate) fn get_new_node(&mut self) -> Result<u32, BTreeError> {
        // A small clump can be used up entirely by a new map node
        while self.header.free_nodes == 0 {
            self.grow()?;
        }
        self.find_free()
    }

    /// Return `node` to the free pool and unlink it from its siblings.
    ///
    /// Header pointers naming the node (first/last leaf, root) move to its
    /// neighbours or to 0.
    pub(crate) fn remove_node(&mut self, node: u32) -> Result<(), BTreeError> {
        let descriptor = self.read_descriptor(node)?;
        self.set_allocated(node, false)?;
        self.header.free_nodes += 1;

        if self.header.first_leaf_node == node {
            self.header.first_leaf_node = descriptor.f_link;
        }
        if self.header.last_leaf_node == node {
            self.header.last_leaf_node = descriptor.b_link;
        }
        if self.header.root_node == node {
            self.header.root_node = 0;
            self.header.tree_depth = 0;
        }

        if descriptor.b_link != 0 {
            let mut previous = self.read_descriptor(descriptor.b_link)?;
            previous.f_link = descriptor.f_link;
            self.write_descriptor(descriptor.b_link, &previous)?;
        }
        if descriptor.f_link != 0 {
            let mut next = self.read_descriptor(descriptor.f_link)?;
            next.b_link = descriptor.b_link;
            self.write_descriptor(descriptor.f_link, &next)?;
        }

        self.persist_header()?;
        tracing::debug!(node, kind = ?descriptor.kind, "removed node");
        Ok(())
    }
}
