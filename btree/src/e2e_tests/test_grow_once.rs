//! Test that exhausting the free nodes grows the store by one clump.

use crate::e2e_tests::helpers::*;
use crate::testing::{int_key, test_options};
use crate::{BTree, BytewiseKeys, MemoryStore, format};

#[test]
fn test_grow_once_when_full() {
    let mut store = MemoryStore::new();
    format(&mut store, &test_options(512, 8, 4)).expect("format");
    let grows_after_format = store.stats().grows;

    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
    let mut grown = false;
    for i in 0..1000u32 {
        tree.insert(&int_key(i), &[0u8; 8]).expect("insert");
        if tree.header().total_nodes != 8 {
            grown = true;
            break;
        }
    }
    assert!(grown, "tree never grew");

    let header = *tree.header();
    assert_eq!(header.total_nodes, 12);
    assert!(header.free_nodes < 4);
    let clear = (8..12)
        .filter(|&node| !tree.is_allocated(node).expect("bit"))
        .count();
    assert_eq!(clear, header.free_nodes as usize);
    assert_consistent(&mut tree);

    drop(tree);
    assert_eq!(store.stats().grows, grows_after_format + 1);
    assert_eq!(store.as_bytes().len(), 12 * 512);
}

#[test]
fn test_grow_refused_surfaces_as_fault() {
    let mut store = MemoryStore::new().with_size_limit(8 * 512);
    format(&mut store, &test_options(512, 8, 4)).expect("format");
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");

    let mut failure = None;
    for i in 0..1000u32 {
        if let Err(error) = tree.insert(&int_key(i), &[0u8; 8]) {
            failure = Some(error);
            break;
        }
    }
    let error = failure.expect("insert fails once the store is full");
    assert!(error.is_fatal());
    assert_eq!(tree.header().total_nodes, 8);
}
