//! Test a tree persisted in a file and reopened.

use tempfile::tempdir;

use crate::e2e_tests::helpers::*;
use crate::testing::{int_key, test_options};
use crate::{BTree, BytewiseKeys, FileStore, format};

#[test]
fn test_file_store_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("extents.btree");

    {
        let mut store = FileStore::create(&path).expect("create");
        format(&mut store, &test_options(512, 8, 8)).expect("format");
        let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
        for i in 0..200u32 {
            tree.insert(&int_key(i), &(i * 3).to_be_bytes()).expect("insert");
        }
        for i in (0..200u32).step_by(4) {
            tree.remove(&int_key(i)).expect("remove");
        }
        tree.close().expect("close");
    }

    let mut store = FileStore::open(&path).expect("open file");
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("reopen");
    assert_eq!(tree.header().leaf_records, 150);
    assert!(tree.header().total_nodes > 8);
    assert_consistent(&mut tree);

    // Key 0 was removed and has no floor; start from 1
    for i in 1..200u32 {
        let hit = tree.search(&int_key(i)).expect("search");
        if i % 4 == 0 {
            assert!(!hit.expect("floor").exact, "key {i}");
        } else {
            let hit = hit.expect("hit");
            assert!(hit.exact);
            assert_eq!(hit.data, (i * 3).to_be_bytes().to_vec());
        }
    }
}

#[test]
fn test_file_store_rejects_existing_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tree");
    FileStore::create(&path).expect("create");
    assert!(FileStore::create(&path).is_err());
}
