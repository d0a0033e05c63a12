// Forbid unwrap() in production code to prevent panics from corrupt volumes.
// Test code is allowed to use unwrap()/expect() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! On-disk B-tree engine for HFS+ volumes.
//!
//! The tree lives inside a paged store made of fixed-size nodes. Node 0 is
//! the header node: it carries the header record (root pointer, depth,
//! capacity counters) and the first chunk of the free-space bitmap. Further
//! bitmap chunks live in map nodes chained from the header node.
//!
//! Records are variable-length `(key, data)` pairs kept in ascending key
//! order. Keys are opaque to the tree: comparison and (de)serialization go
//! through a [`KeyOps`] implementation supplied when the tree is opened.
//!
//! # Usage
//!
//! ```
//! use hfsplus_btree::{BTree, BytewiseKeys, FormatOptions, MemoryStore, format};
//!
//! let mut store = MemoryStore::new();
//! let options = FormatOptions { node_size: 512, max_key_length: 32, ..FormatOptions::default() };
//! format(&mut store, &options).expect("format");
//!
//! let mut tree = BTree::open(&mut store, BytewiseKeys).expect("open");
//! tree.insert(&b"alpha".to_vec(), b"one").expect("insert");
//!
//! let hit = tree.search(&b"alpha".to_vec()).expect("search").expect("hit");
//! assert!(hit.exact);
//! assert_eq!(hit.data, b"one".to_vec());
//! assert!(tree.check().is_consistent());
//! ```
//!
//! # Concurrency
//!
//! The engine performs no locking. A [`BTree`] holds an exclusive borrow of
//! its store for its whole lifetime, so mutating calls are serialized by the
//! borrow checker.

pub mod config;
mod format;
pub mod header;
pub mod keys;
pub mod node;
pub mod store;
mod tree;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod testing;

pub use config::{ConfigError, FormatOptions};
pub use format::format;
pub use header::HeaderRecord;
pub use keys::{BytewiseKeys, ExtentDescriptor, ExtentKey, ExtentKeys, ExtentRecord, KeyError, KeyOps};
pub use node::{NodeDescriptor, NodeError, NodeKind};
pub use store::{FaultConfig, FileStore, MemoryStore, Store, StoreError, StoreStats};
pub use tree::{BTree, BTreeError, CheckError, Cursor, Report, SearchHit};
