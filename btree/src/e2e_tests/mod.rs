//! End-to-end tests at the tree operation level.
//!
//! Each test file covers a specific scenario, using deterministic inputs
//! to drive the public operations and verify the tree with the checker
//! afterwards.

#![cfg(test)]

mod helpers;

mod test_extent_keys;
mod test_file_store;
mod test_grow_once;
mod test_insert_hundred;
mod test_io_faults;
mod test_map_node_growth;
mod test_random_large_records;
mod test_random_operations;
mod test_remove_all_ascending;
mod test_search_after_remove;
