//! Test growth past the header node's bitmap into a map node.

use crate::e2e_tests::helpers::*;
use crate::testing::{int_key, test_options};
use crate::{BTree, BytewiseKeys, MemoryStore, NodeKind, format};

#[test]
fn test_map_node_appended_on_growth() {
    // The header bitmap of a 512-byte node covers 2048 nodes
    let mut store = MemoryStore::new();
    format(&mut store, &test_options(512, 2040, 64)).expect("format");
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");

    // 106-byte records: at most four per node, so nodes fill quickly
    let mut next = 0u32;
    while tree.header().total_nodes == 2040 {
        tree.insert(&int_key(next), &[7u8; 100]).expect("insert");
        next += 1;
        assert!(next < 20_000, "tree never grew");
    }

    assert_eq!(tree.header().total_nodes, 2104);
    assert_eq!(tree.read_descriptor(0).expect("header node").f_link, 2040);
    let map = tree.read_descriptor(2040).expect("map node");
    assert_eq!(map.kind, NodeKind::Map);
    assert!(tree.is_allocated(2040).expect("bit"));
    assert_consistent(&mut tree);
    assert_eq!(tree.check().map_nodes, 1);

    // Keep going until allocation reaches bits held by the map node
    for _ in 0..100 {
        tree.insert(&int_key(next), &[7u8; 100]).expect("insert");
        next += 1;
    }
    assert!(tree.is_allocated(2048).expect("bit"));
    assert_consistent(&mut tree);
    assert_eq!(tree.header().leaf_records, next);
}
