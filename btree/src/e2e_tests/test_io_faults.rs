//! Test that store failures surface as fatal I/O errors.

use crate::testing::{int_key, new_tree_store, test_options};
use crate::{BTree, BTreeError, BytewiseKeys, FaultConfig, MemoryStore, StoreError, format};

#[test]
fn test_failing_writes_abort_insert() {
    let mut store = new_tree_store(512, 16);
    store.set_fault_config(FaultConfig::failing_writes());

    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open reads only");
    let error = tree.insert(&int_key(1), b"value").expect_err("write fails");
    assert!(matches!(error, BTreeError::Io(StoreError::InjectedFault(_))));
    assert!(error.is_fatal());
}

#[test]
fn test_failing_reads_abort_search() {
    let mut store = new_tree_store(512, 16);
    {
        let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
        tree.insert(&int_key(1), b"value").expect("insert");
    }
    store.set_fault_config(FaultConfig {
        read_error_rate: 1.0,
        ..FaultConfig::no_faults()
    });

    assert!(matches!(
        BTree::open(&mut store, BytewiseKeys),
        Err(BTreeError::Io(_))
    ));
    assert_eq!(store.stats().injected_read_errors, 1);
}

#[test]
fn test_low_fault_rate_never_panics() {
    let mut store = MemoryStore::with_faults(11, FaultConfig::no_faults());
    format(&mut store, &test_options(512, 32, 8)).expect("format");
    store.set_fault_config(FaultConfig::low_faults());

    let mut failed = false;
    if let Ok(mut tree) = BTree::open(&mut store, BytewiseKeys) {
        for i in 0..500u32 {
            if let Err(error) = tree.insert(&int_key(i), &[0u8; 8]) {
                assert!(error.is_fatal(), "{error}");
                failed = true;
                break;
            }
        }
    }
    store.set_fault_config(FaultConfig::no_faults());

    // A fault may leave the tree damaged; the checker still reports
    // instead of panicking.
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("reopen");
    let report = tree.check();
    if !failed {
        assert!(report.is_consistent(), "{:?}", report.errors);
    }
}
