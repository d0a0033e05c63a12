//! Test the extents overflow key layout end to end.

use crate::e2e_tests::helpers::*;
use crate::keys::{DATA_FORK, RESOURCE_FORK};
use crate::testing::new_tree_store;
use crate::{BTree, ExtentDescriptor, ExtentKey, ExtentKeys, ExtentRecord};

fn extent_record(start: u32, blocks: u32) -> ExtentRecord {
    let mut record = ExtentRecord::default();
    record.0[0] = ExtentDescriptor {
        start_block: start,
        block_count: blocks,
    };
    record
}

fn key(file_id: u32, fork_type: u8, start_block: u32) -> ExtentKey {
    ExtentKey {
        fork_type,
        file_id,
        start_block,
    }
}

#[test]
fn test_extent_keys_order_and_floor_lookup() {
    let mut store = new_tree_store(512, 64);
    let mut tree = BTree::open(&mut store, ExtentKeys).expect("open");

    // Each file gets overflow extents every 100 file blocks, both forks
    for file_id in (16..40u32).rev() {
        for fork in [RESOURCE_FORK, DATA_FORK] {
            for run in 0..3u32 {
                let record = extent_record(file_id * 1000 + run * 100, 100);
                tree.insert(&key(file_id, fork, run * 100), &record.to_bytes())
                    .expect("insert");
            }
        }
    }
    assert_eq!(tree.header().leaf_records, 24 * 2 * 3);
    assert!(tree.header().tree_depth >= 2);
    assert_consistent(&mut tree);

    // The extent covering file block 150 of file 20's data fork starts at 100
    let hit = tree
        .search(&key(20, DATA_FORK, 150))
        .expect("search")
        .expect("floor");
    assert!(!hit.exact);
    assert_eq!(hit.data, extent_record(20_100, 100));
    assert_eq!(hit.data.block_count(), 100);

    // Walk file 20 in order: data fork runs first, then resource fork
    let mut cursor = tree.cursor_from(&key(20, DATA_FORK, 0)).expect("cursor");
    let mut seen = Vec::new();
    while let Some((found, _)) = cursor.next_entry().expect("next") {
        if found.file_id != 20 {
            break;
        }
        seen.push((found.fork_type, found.start_block));
    }
    assert_eq!(
        seen,
        vec![
            (DATA_FORK, 0),
            (DATA_FORK, 100),
            (DATA_FORK, 200),
            (RESOURCE_FORK, 0),
            (RESOURCE_FORK, 100),
            (RESOURCE_FORK, 200),
        ]
    );

    let listing = tree.check_with_listing().listing.expect("listing");
    assert!(listing.contains("Index node"));
}
