//! Common helpers for end-to-end tests.

use crate::{BTree, BytewiseKeys, KeyOps, NodeKind, Store};

/// Assert the checker finds nothing and both passes count every tree node.
pub fn assert_consistent<S: Store, K: KeyOps>(tree: &mut BTree<'_, S, K>) {
    let report = tree.check();
    assert!(report.is_consistent(), "{:#?}", report.errors);

    let header = *tree.header();
    let in_use = header.total_nodes - header.free_nodes - report.map_nodes - 1;
    assert_eq!(report.traverse_count, in_use);
    assert_eq!(report.linear_count, in_use);
}

/// Every key in leaf-chain order.
pub fn leaf_keys<S: Store>(tree: &mut BTree<'_, S, BytewiseKeys>) -> Vec<Vec<u8>> {
    let mut cursor = tree.cursor().expect("cursor");
    let mut keys = Vec::new();
    while let Some((key, _)) = cursor.next_entry().expect("next entry") {
        keys.push(key);
    }
    keys
}

/// Walk the leaf chain by descriptor, returning `(node, kind, height)`.
pub fn leaf_chain<S: Store, K: KeyOps>(tree: &mut BTree<'_, S, K>) -> Vec<(u32, NodeKind, u8)> {
    let mut chain = Vec::new();
    let mut number = tree.header().first_leaf_node;
    while number != 0 {
        let descriptor = tree.read_descriptor(number).expect("descriptor");
        chain.push((number, descriptor.kind, descriptor.height));
        number = descriptor.f_link;
        assert!(chain.len() <= tree.header().total_nodes as usize, "leaf chain loops");
    }
    chain
}
