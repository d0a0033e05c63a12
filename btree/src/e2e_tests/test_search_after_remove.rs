//! Test floor search results after records are removed.

use crate::testing::{int_key, new_tree_store};
use crate::{BTree, BTreeError, BytewiseKeys};

#[test]
fn test_search_after_remove() {
    let mut store = new_tree_store(512, 64);
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
    for i in (10..=500u32).step_by(10) {
        tree.insert(&int_key(i), &i.to_be_bytes()).expect("insert");
    }

    tree.remove(&int_key(250)).expect("remove");
    let hit = tree.search(&int_key(250)).expect("search").expect("floor");
    assert!(!hit.exact);
    assert_eq!(hit.data, 240u32.to_be_bytes().to_vec());

    // Removing the smallest key moves the floor boundary up
    tree.remove(&int_key(10)).expect("remove");
    for key in [10, 15] {
        assert!(matches!(
            tree.search(&int_key(key)),
            Err(BTreeError::ConsistencyFault(_))
        ));
    }
    let hit = tree.search(&int_key(20)).expect("search").expect("hit");
    assert!(hit.exact);
    assert_eq!(hit.node, tree.header().first_leaf_node);
    assert_eq!(hit.record, 0);

    // Removing the largest key moves the tail floor down
    tree.remove(&int_key(500)).expect("remove");
    let hit = tree.search(&int_key(9999)).expect("search").expect("floor");
    assert!(!hit.exact);
    assert_eq!(hit.data, 490u32.to_be_bytes().to_vec());
    assert_eq!(hit.node, tree.header().last_leaf_node);
}
