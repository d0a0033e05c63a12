//! Formatting of a fresh, empty tree.

#![allow(clippy::cast_possible_truncation)]

use crate::config::FormatOptions;
use crate::header::{HeaderRecord, USER_DATA_SIZE, header_map_len, map_node_len};
use crate::node::{Node, NodeDescriptor, NodeKind};
use crate::store::Store;
use crate::tree::{BTreeError, NodeContext};

/// Number of map nodes needed beyond the header node's bitmap record.
#[must_use]
pub fn map_nodes_needed(node_size: usize, total_nodes: u32) -> u32 {
    let header_bits = header_map_len(node_size) * 8;
    let total = total_nodes as usize;
    if total <= header_bits {
        return 0;
    }
    let bits_per_map_node = map_node_len(node_size) * 8;
    (total - header_bits).div_ceil(bits_per_map_node) as u32
}

/// Write an empty tree into `store`.
///
/// The store is grown to `total_nodes` nodes if it is smaller. Node 0
/// becomes the header node; map nodes, if the header's bitmap record is too
/// small for `total_nodes`, follow it as nodes `1..`. Those nodes are marked
/// used, every other node is free.
pub fn format<S: Store>(store: &mut S, options: &FormatOptions) -> Result<HeaderRecord, BTreeError> {
    options.validate()?;

    let node_size = usize::from(options.node_size);
    let map_nodes = map_nodes_needed(node_size, options.total_nodes);
    let size = u64::from(options.total_nodes) * node_size as u64;
    if store.size() < size && store.allocate_more(size)? < size {
        return Err(BTreeError::ConsistencyFault(format!(
            "store could not grow to {size} bytes"
        )));
    }

    let header = HeaderRecord {
        tree_depth: 0,
        root_node: 0,
        leaf_records: 0,
        first_leaf_node: 0,
        last_leaf_node: 0,
        node_size: options.node_size,
        max_key_length: options.max_key_length,
        total_nodes: options.total_nodes,
        free_nodes: options.total_nodes - 1 - map_nodes,
        reserved1: 0,
        clump_size: options.clump_size,
        btree_type: options.btree_type,
        key_compare_type: options.key_compare_type,
        attributes: options.attributes,
        reserved3: [0; 16],
    };

    // One bitmap covering the header record and every map node
    let header_len = header_map_len(node_size);
    let map_len = map_node_len(node_size);
    let mut bitmap = vec![0u8; header_len + map_len * map_nodes as usize];
    for node in 0..=map_nodes as usize {
        bitmap[node / 8] |= 0x80 >> (node % 8);
    }

    let mut descriptor = NodeDescriptor::new(NodeKind::Header, 0);
    descriptor.f_link = u32::from(map_nodes > 0);
    let mut header_node = Node::new(0, node_size, &descriptor);
    header_node.insert_record(0, &header.to_bytes()).at(0)?;
    header_node.insert_record(1, &[0u8; USER_DATA_SIZE]).at(0)?;
    header_node.insert_record(2, &bitmap[..header_len]).at(0)?;
    store.write(0, header_node.as_bytes())?;

    for (i, chunk) in bitmap[header_len..].chunks(map_len).enumerate() {
        let number = i as u32 + 1;
        let mut descriptor = NodeDescriptor::new(NodeKind::Map, 0);
        if number < map_nodes {
            descriptor.f_link = number + 1;
        }
        let mut map_node = Node::new(number, node_size, &descriptor);
        map_node.insert_record(0, chunk).at(number)?;
        store.write(u64::from(number) * node_size as u64, map_node.as_bytes())?;
    }

    tracing::debug!(
        node_size,
        total_nodes = options.total_nodes,
        map_nodes,
        "formatted b-tree"
    );
    Ok(header)
}
