//! Test inserting integer keys 1..=100 into 512-byte nodes.

use crate::e2e_tests::helpers::*;
use crate::testing::{int_key, new_tree_store};
use crate::{BTree, BytewiseKeys, NodeKind};

#[test]
fn test_insert_hundred_keys() {
    let mut store = new_tree_store(512, 64);
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");

    for i in 1..=100u32 {
        tree.insert(&int_key(i), &u64::from(i).to_be_bytes())
            .expect("insert");
    }

    let header = *tree.header();
    assert_eq!(header.leaf_records, 100);
    assert!(header.tree_depth >= 2);
    assert_consistent(&mut tree);

    let chain = leaf_chain(&mut tree);
    assert!(chain.len() > 1);
    for (node, kind, height) in chain {
        assert_eq!(kind, NodeKind::Leaf, "node {node}");
        assert_eq!(height, 1, "node {node}");
    }

    for i in 1..=100u32 {
        let hit = tree.search(&int_key(i)).expect("search").expect("hit");
        assert!(hit.exact);
        assert_eq!(hit.data, u64::from(i).to_be_bytes().to_vec());
    }
    let expected: Vec<_> = (1..=100).map(int_key).collect();
    assert_eq!(leaf_keys(&mut tree), expected);
}

#[test]
fn test_insert_hundred_keys_survives_reopen() {
    let mut store = new_tree_store(512, 64);
    {
        let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
        for i in (1..=100u32).rev() {
            tree.insert(&int_key(i), &[0u8; 8]).expect("insert");
        }
        tree.close().expect("close");
    }

    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("reopen");
    assert_eq!(tree.header().leaf_records, 100);
    assert_consistent(&mut tree);
}
