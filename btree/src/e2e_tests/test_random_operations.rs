//! Test seeded random inserts and removes against an in-memory model.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;
use crate::testing::{init_tracing, int_key, new_tree_store};
use crate::{BTree, BTreeError, BytewiseKeys};

fn run(seed: u64, operations: usize) {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    let mut store = new_tree_store(512, 32);
    let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");

    for step in 0..operations {
        let key = int_key(rng.random_range(0..400));
        if model.contains_key(&key) && rng.random_bool(0.6) {
            tree.remove(&key).expect("remove");
            model.remove(&key);
        } else {
            let len = rng.random_range(0..16);
            let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            match tree.insert(&key, &data) {
                Ok(()) => {
                    assert!(model.insert(key, data).is_none(), "step {step}");
                }
                Err(BTreeError::AlreadyExists) => {
                    assert!(model.contains_key(&key), "step {step}");
                }
                Err(error) => panic!("step {step}: {error}"),
            }
        }

        if step % 500 == 0 {
            assert_consistent(&mut tree);
        }
    }

    assert_consistent(&mut tree);
    assert_eq!(tree.header().leaf_records as usize, model.len());

    let keys: Vec<_> = model.keys().cloned().collect();
    assert_eq!(leaf_keys(&mut tree), keys);
    for (key, data) in &model {
        let hit = tree.search(key).expect("search").expect("hit");
        assert!(hit.exact);
        assert_eq!(&hit.data, data);
    }
}

#[test]
fn test_random_operations() {
    run(7, 3000);
}

#[test]
fn test_random_operations_other_seeds() {
    for seed in [1, 2, 3] {
        run(seed, 1000);
    }
}
