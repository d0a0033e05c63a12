//! Read-only consistency check.
//!
//! Two independent passes must agree. The top-down pass walks from the root
//! through child pointers; the linear pass walks each level along its
//! sibling chain, starting from the leftmost node the first pass saw at
//! that height. Violations are collected, never raised.

#![allow(clippy::cast_possible_truncation)]

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use crate::keys::KeyOps;
use crate::node::{Node, NodeDescriptor, NodeError, NodeKind};
use crate::store::Store;

use super::BTree;
use super::alloc::bit_is_set;

/// A violated tree property.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("node {node} could not be read: {reason}")]
    Unreadable { node: u32, reason: String },
    #[error("bitmap covers {covered} nodes but the tree has {total}")]
    NotEnoughMapNodes { covered: u64, total: u32 },
    #[error("bitmap has {counted} free nodes but the header says {header}")]
    FreeNodeMismatch { counted: u32, header: u32 },
    #[error("empty tree has first leaf {first}, last leaf {last}, depth {depth}, {records} records")]
    EmptyTreeHeader {
        first: u32,
        last: u32,
        depth: u16,
        records: u32,
    },
    #[error("node {node} is a {kind:?} node inside the tree")]
    UnexpectedKind { node: u32, kind: NodeKind },
    #[error("node {node} is in use but not marked in the bitmap")]
    NotAllocated { node: u32 },
    #[error("root node {node} has height {height} but the tree depth is {depth}")]
    RootHeight { node: u32, height: u8, depth: u16 },
    #[error("node {node} has height {height}, expected {expected}")]
    NodeHeight { node: u32, height: u8, expected: u16 },
    #[error("{kind:?} node {node} has height {height}")]
    KindHeight { node: u32, kind: NodeKind, height: u8 },
    #[error("node {node} has no records")]
    EmptyNode { node: u32 },
    #[error("node {node} has {count} records, more than its offset table can hold")]
    RecordPastOffsets { node: u32, count: usize },
    #[error("node {node} offset table entry {index} is out of order")]
    OffsetsOutOfOrder { node: u32, index: usize },
    #[error("node {node} record {index} is not above the key before it")]
    TraverseOrder { node: u32, index: usize },
    #[error("node {node} record {index} does not match the first key of child {child}")]
    SeparatorMismatch { node: u32, index: usize, child: u32 },
    #[error("node {node} record {index} sorts above the last key of child {child}")]
    LastKeyBelowSeparator { node: u32, index: usize, child: u32 },
    #[error("node {node} is reached twice")]
    NodeRevisited { node: u32 },
    #[error("first leaf is {chain} but the header says {header}")]
    FirstLeaf { chain: u32, header: u32 },
    #[error("last leaf is {chain} but the header says {header}")]
    LastLeaf { chain: u32, header: u32 },
    #[error("node {node} links back to {b_link}, expected {expected}")]
    BrokenBackLink { node: u32, b_link: u32, expected: u32 },
    #[error("node {node} in the level {expected} chain has height {height}")]
    LevelHeight { node: u32, height: u8, expected: u16 },
    #[error("node {node} record {index} breaks key order along its level")]
    LinearOrder { node: u32, index: usize },
    #[error("level {height} chain does not terminate")]
    ChainTooLong { height: u16 },
    #[error("leaf chain holds {counted} records but the header says {header}")]
    LeafRecordCount { counted: u32, header: u32 },
    #[error("top-down pass found {traverse} nodes, linear pass found {linear}")]
    CountMismatch { traverse: u32, linear: u32 },
    #[error("{counted} tree nodes found, the header accounts for {expected}")]
    CapacityMismatch { counted: u32, expected: i64 },
}

/// Outcome of [`BTree::check`].
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub errors: Vec<CheckError>,
    /// Tree nodes reached from the root.
    pub traverse_count: u32,
    /// Tree nodes reached along the level chains.
    pub linear_count: u32,
    /// Map nodes chained from the header node.
    pub map_nodes: u32,
    /// Indented dump of the tree, if requested.
    pub listing: Option<String>,
}

impl Report {
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.errors.is_empty()
    }
}

/// First and last key bodies of a subtree.
struct Subtree {
    first: Vec<u8>,
    last: Vec<u8>,
}

#[derive(Default)]
struct CheckState {
    report: Report,
    bitmap: Option<Vec<u8>>,
    visited: HashSet<u32>,
    /// Leftmost node seen at each height.
    levels: BTreeMap<u16, u32>,
}

impl CheckState {
    fn fail(&mut self, error: CheckError) {
        self.report.errors.push(error);
    }

    fn allocated(&self, node: u32) -> bool {
        self.bitmap
            .as_ref()
            .is_none_or(|bitmap| bit_is_set(bitmap, u64::from(node)))
    }
}

fn layout_error(node: u32, error: NodeError) -> CheckError {
    match error {
        NodeError::TooManyRecords { count } => CheckError::RecordPastOffsets { node, count },
        NodeError::BadOffset { index, .. } => CheckError::OffsetsOutOfOrder { node, index },
        other => CheckError::Unreadable {
            node,
            reason: other.to_string(),
        },
    }
}

impl<S: Store, K: KeyOps> BTree<'_, S, K> {
    /// Verify the tree and return every violation found.
    pub fn check(&mut self) -> Report {
        self.run_check(false)
    }

    /// Like [`check`](Self::check), also rendering the tree into
    /// [`Report::listing`].
    pub fn check_with_listing(&mut self) -> Report {
        self.run_check(true)
    }

    fn run_check(&mut self, listing: bool) -> Report {
        let mut state = CheckState::default();
        if listing {
            state.report.listing = Some(String::new());
        }

        self.check_map(&mut state);

        let header = self.header;
        if header.root_node == 0 {
            if header.first_leaf_node != 0
                || header.last_leaf_node != 0
                || header.tree_depth != 0
                || header.leaf_records != 0
            {
                state.fail(CheckError::EmptyTreeHeader {
                    first: header.first_leaf_node,
                    last: header.last_leaf_node,
                    depth: header.tree_depth,
                    records: header.leaf_records,
                });
            }
        } else {
            self.traverse_node(&mut state, header.root_node, header.tree_depth, true, 0);
            self.linear_check(&mut state);
        }

        let report = &state.report;
        if report.traverse_count != report.linear_count {
            let error = CheckError::CountMismatch {
                traverse: report.traverse_count,
                linear: report.linear_count,
            };
            state.fail(error);
        }
        let expected = i64::from(header.total_nodes)
            - i64::from(header.free_nodes)
            - i64::from(state.report.map_nodes)
            - 1;
        if i64::from(state.report.traverse_count) != expected {
            let error = CheckError::CapacityMismatch {
                counted: state.report.traverse_count,
                expected,
            };
            state.fail(error);
        }

        let report = state.report;
        for error in &report.errors {
            tracing::warn!(%error, "b-tree check");
        }
        tracing::info!(
            errors = report.error_count(),
            traverse_count = report.traverse_count,
            linear_count = report.linear_count,
            map_nodes = report.map_nodes,
            "b-tree check finished"
        );
        report
    }

    /// Check that the bitmap covers the tree and agrees with `free_nodes`.
    fn check_map(&mut self, state: &mut CheckState) {
        let segments = match self.map_segments() {
            Ok(segments) => segments,
            Err(error) => {
                state.fail(CheckError::Unreadable {
                    node: 0,
                    reason: error.to_string(),
                });
                return;
            }
        };

        let bitmap: Vec<u8> = segments.iter().flat_map(|s| s.bits.iter().copied()).collect();
        state.report.map_nodes = (segments.len() - 1) as u32;
        let total = self.header.total_nodes;
        let covered = bitmap.len() as u64 * 8;
        if covered < u64::from(total) {
            state.fail(CheckError::NotEnoughMapNodes { covered, total });
        }

        let free = (0..u64::from(total).min(covered))
            .filter(|&node| !bit_is_set(&bitmap, node))
            .count() as u32;
        if free != self.header.free_nodes {
            state.fail(CheckError::FreeNodeMismatch {
                counted: free,
                header: self.header.free_nodes,
            });
        }

        for segment in &segments {
            if !bit_is_set(&bitmap, u64::from(segment.node)) {
                state.fail(CheckError::NotAllocated { node: segment.node });
            }
        }
        state.bitmap = Some(bitmap);
    }

    fn compare_bodies(&self, a: &[u8], b: &[u8]) -> Result<Ordering, String> {
        let a = self.keys.read_key(a).map_err(|e| e.to_string())?;
        let b = self.keys.read_key(b).map_err(|e| e.to_string())?;
        Ok(self.keys.compare(&a, &b))
    }

    fn printed_key(&self, body: &[u8]) -> String {
        self.keys
            .read_key(body)
            .map_or_else(|_| format!("<{} undecodable bytes>", body.len()), |key| self.keys.print_key(&key))
    }

    /// Read a node for checking, reporting why it cannot be used.
    fn checked_node(&mut self, state: &mut CheckState, number: u32) -> Option<(Node, NodeDescriptor)> {
        let node = match self.load_node_raw(number) {
            Ok(node) => node,
            Err(error) => {
                state.fail(CheckError::Unreadable {
                    node: number,
                    reason: error.to_string(),
                });
                return None;
            }
        };
        let descriptor = match node.descriptor() {
            Ok(descriptor) => descriptor,
            Err(error) => {
                state.fail(layout_error(number, error));
                return None;
            }
        };
        if let Err(error) = node.validate() {
            state.fail(layout_error(number, error));
            return None;
        }
        Some((node, descriptor))
    }

    /// Check the subtree at `number`, returning its key range.
    fn traverse_node(
        &mut self,
        state: &mut CheckState,
        number: u32,
        expected: u16,
        is_root: bool,
        indent: usize,
    ) -> Option<Subtree> {
        if !state.visited.insert(number) {
            state.fail(CheckError::NodeRevisited { node: number });
            return None;
        }
        let (node, descriptor) = self.checked_node(state, number)?;
        let count = node.num_records();

        if let Some(listing) = state.report.listing.as_mut() {
            let _ = writeln!(
                listing,
                "{:indent$}{:?} node {number} (height {}, {count} records)",
                "",
                descriptor.kind,
                descriptor.height,
                indent = indent * 2
            );
        }

        if !descriptor.kind.is_keyed() {
            state.fail(CheckError::UnexpectedKind {
                node: number,
                kind: descriptor.kind,
            });
            return None;
        }
        state.report.traverse_count += 1;
        state.levels.entry(expected).or_insert(number);

        if !state.allocated(number) {
            state.fail(CheckError::NotAllocated { node: number });
        }
        if is_root {
            if u16::from(descriptor.height) != expected {
                state.fail(CheckError::RootHeight {
                    node: number,
                    height: descriptor.height,
                    depth: expected,
                });
            }
        } else if u16::from(descriptor.height) != expected {
            state.fail(CheckError::NodeHeight {
                node: number,
                height: descriptor.height,
                expected,
            });
        }
        if (descriptor.kind == NodeKind::Leaf) != (descriptor.height == 1) {
            state.fail(CheckError::KindHeight {
                node: number,
                kind: descriptor.kind,
                height: descriptor.height,
            });
        }
        if count == 0 {
            state.fail(CheckError::EmptyNode { node: number });
            return None;
        }

        let mut keys = Vec::with_capacity(count);
        for index in 0..count {
            match node.key(index) {
                Ok(key) => keys.push(key.to_vec()),
                Err(error) => {
                    state.fail(layout_error(number, error));
                    return None;
                }
            }
        }
        for index in 1..count {
            match self.compare_bodies(&keys[index - 1], &keys[index]) {
                Ok(Ordering::Less) => {}
                Ok(_) => state.fail(CheckError::TraverseOrder { node: number, index }),
                Err(reason) => state.fail(CheckError::Unreadable { node: number, reason }),
            }
        }

        if descriptor.kind == NodeKind::Leaf || expected <= 1 {
            if let Some(listing) = state.report.listing.as_mut() {
                for key in &keys {
                    let _ = writeln!(listing, "{:indent$}{}", "", self.printed_key(key), indent = indent * 2 + 2);
                }
            }
            let last = keys[count - 1].clone();
            let first = keys.swap_remove(0);
            return Some(Subtree { first, last });
        }

        let mut last = keys[count - 1].clone();
        let mut previous_last: Option<Vec<u8>> = None;
        for (index, separator) in keys.iter().enumerate() {
            let child = match node.child(index) {
                Ok(child) => child,
                Err(error) => {
                    state.fail(layout_error(number, error));
                    continue;
                }
            };

            if let Some(previous) = &previous_last {
                if self.compare_bodies(previous, separator).is_ok_and(|o| o != Ordering::Less) {
                    state.fail(CheckError::TraverseOrder { node: number, index });
                }
            }

            let Some(subtree) = self.traverse_node(state, child, expected - 1, false, indent + 1) else {
                previous_last = None;
                continue;
            };
            if self.compare_bodies(separator, &subtree.first) != Ok(Ordering::Equal) {
                state.fail(CheckError::SeparatorMismatch {
                    node: number,
                    index,
                    child,
                });
            }
            if self.compare_bodies(&subtree.last, separator) == Ok(Ordering::Less) {
                state.fail(CheckError::LastKeyBelowSeparator {
                    node: number,
                    index,
                    child,
                });
            }
            if index == count - 1 {
                last.clone_from(&subtree.last);
            }
            previous_last = Some(subtree.last);
        }

        Some(Subtree {
            first: keys.swap_remove(0),
            last,
        })
    }

    /// Walk every level along its sibling chain.
    fn linear_check(&mut self, state: &mut CheckState) {
        let levels: Vec<(u16, u32)> = state.levels.iter().map(|(h, n)| (*h, *n)).collect();
        let limit = self.header.total_nodes;

        for (height, start) in levels {
            let mut number = start;
            let mut previous = 0;
            let mut previous_key: Option<Vec<u8>> = None;
            let mut steps = 0;
            let mut leaf_records = 0u32;

            while number != 0 {
                steps += 1;
                if steps > limit {
                    state.fail(CheckError::ChainTooLong { height });
                    break;
                }
                let Some((node, descriptor)) = self.checked_node(state, number) else {
                    break;
                };

                if descriptor.b_link != previous {
                    state.fail(CheckError::BrokenBackLink {
                        node: number,
                        b_link: descriptor.b_link,
                        expected: previous,
                    });
                }
                if u16::from(descriptor.height) != height || !descriptor.kind.is_keyed() {
                    state.fail(CheckError::LevelHeight {
                        node: number,
                        height: descriptor.height,
                        expected: height,
                    });
                }
                if !state.allocated(number) {
                    state.fail(CheckError::NotAllocated { node: number });
                }

                for index in 0..node.num_records() {
                    let Ok(key) = node.key(index) else {
                        break;
                    };
                    if let Some(before) = &previous_key {
                        if self.compare_bodies(before, key).is_ok_and(|o| o != Ordering::Less) {
                            state.fail(CheckError::LinearOrder { node: number, index });
                        }
                    }
                    previous_key = Some(key.to_vec());
                }

                state.report.linear_count += 1;
                leaf_records += node.num_records() as u32;
                previous = number;
                number = descriptor.f_link;
            }

            if height == 1 {
                if start != self.header.first_leaf_node {
                    state.fail(CheckError::FirstLeaf {
                        chain: start,
                        header: self.header.first_leaf_node,
                    });
                }
                if previous != self.header.last_leaf_node {
                    state.fail(CheckError::LastLeaf {
                        chain: previous,
                        header: self.header.last_leaf_node,
                    });
                }
                if leaf_records != self.header.leaf_records {
                    state.fail(CheckError::LeafRecordCount {
                        counted: leaf_records,
                        header: self.header.leaf_records,
                    });
                }
            }
        }
    }
}
