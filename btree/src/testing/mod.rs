use crate::{FormatOptions, MemoryStore, format};

/// Format options for small test trees.
///
/// Growth adds `clump_nodes` nodes at a time.
pub fn test_options(node_size: u16, total_nodes: u32, clump_nodes: u32) -> FormatOptions {
    FormatOptions {
        node_size,
        total_nodes,
        clump_size: u32::from(node_size) * clump_nodes,
        max_key_length: 64,
        ..FormatOptions::default()
    }
}

/// Create an in-memory store holding a freshly formatted, empty tree.
pub fn new_tree_store(node_size: u16, total_nodes: u32) -> MemoryStore {
    let mut store = MemoryStore::new();
    format(&mut store, &test_options(node_size, total_nodes, 8)).expect("format test tree");
    store
}

/// A big-endian integer key, so bytewise order matches numeric order.
pub fn int_key(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Install a log subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
