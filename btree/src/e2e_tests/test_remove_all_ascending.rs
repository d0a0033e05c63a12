//! Test that removing every key leaves an empty, consistent tree.

use crate::e2e_tests::helpers::*;
use crate::testing::{int_key, new_tree_store};
use crate::{BTree, BTreeError, BytewiseKeys};

#[test]
fn test_remove_all_ascending() {
    let mut store = new_tree_store(512, 64);
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
    for i in 0..300u32 {
        tree.insert(&int_key(i), &[0u8; 8]).expect("insert");
    }
    assert!(tree.header().tree_depth >= 2);

    for i in 0..300u32 {
        tree.remove(&int_key(i)).expect("remove");
        if i % 50 == 0 {
            assert_consistent(&mut tree);
        }
    }

    let header = *tree.header();
    assert_eq!(header.root_node, 0);
    assert_eq!(header.tree_depth, 0);
    assert_eq!(header.first_leaf_node, 0);
    assert_eq!(header.last_leaf_node, 0);
    assert_eq!(header.leaf_records, 0);
    assert_eq!(header.free_nodes, header.total_nodes - 1);
    assert_consistent(&mut tree);

    assert!(matches!(tree.remove(&int_key(0)), Err(BTreeError::NotFound)));
    assert!(leaf_keys(&mut tree).is_empty());
}

#[test]
fn test_remove_all_descending_then_refill() {
    let mut store = new_tree_store(512, 64);
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
    for i in 0..150u32 {
        tree.insert(&int_key(i), &[1u8; 8]).expect("insert");
    }
    for i in (0..150u32).rev() {
        tree.remove(&int_key(i)).expect("remove");
    }
    assert!(tree.header().is_empty());
    assert_consistent(&mut tree);

    for i in 0..150u32 {
        tree.insert(&int_key(i), &[2u8; 8]).expect("refill");
    }
    assert_eq!(tree.header().leaf_records, 150);
    assert_consistent(&mut tree);
}
