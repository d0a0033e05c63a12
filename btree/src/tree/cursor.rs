//! In-order iteration along the leaf chain.

use std::collections::VecDeque;

use crate::keys::KeyOps;
use crate::node::NodeKind;
use crate::store::Store;

use super::{BTree, BTreeError, NodeContext};

impl<'a, S: Store, K: KeyOps> BTree<'a, S, K> {
    /// Create a cursor at the first record of the tree.
    pub fn cursor(&mut self) -> Result<Cursor<'_, 'a, S, K>, BTreeError> {
        let first = self.header.first_leaf_node;
        Ok(Cursor::new(self, first, 0))
    }

    /// Create a cursor at the first record whose key is not below `key`.
    ///
    /// Unlike [`BTree::search`], a key below every key in the tree is fine
    /// here: the cursor starts at the first record.
    pub fn cursor_from(&mut self, key: &K::Key) -> Result<Cursor<'_, 'a, S, K>, BTreeError> {
        let mut number = self.header.root_node;
        if number == 0 {
            return Ok(Cursor::new(self, 0, 0));
        }

        for _ in 0..=self.header.tree_depth {
            let (node, descriptor) = self.load_tree_node(number)?;
            let position = self.locate(&node, key)?;
            if descriptor.kind == NodeKind::Leaf {
                return Ok(Cursor::new(self, number, position.index));
            }
            // Keys below the first separator still belong to the first child
            let record = position.floor().unwrap_or(0);
            number = node.child(record).at(number)?;
        }

        Err(BTreeError::ConsistencyFault(format!(
            "cursor did not reach a leaf within {} levels",
            self.header.tree_depth
        )))
    }
}

/// Walks leaf records in key order, following `f_link`.
pub struct Cursor<'t, 'a, S: Store, K: KeyOps> {
    tree: &'t mut BTree<'a, S, K>,
    current_node: u32,
    current_index: usize,
    current_entries: Option<VecDeque<(K::Key, K::Data)>>,
    /// Leaves visited, bounded by the node count to survive link cycles.
    visited: u32,
}

impl<'t, 'a, S: Store, K: KeyOps> Cursor<'t, 'a, S, K> {
    fn new(tree: &'t mut BTree<'a, S, K>, node: u32, index: usize) -> Self {
        Self {
            tree,
            current_node: node,
            current_index: index,
            current_entries: None,
            visited: 0,
        }
    }

    /// Get the next record.
    pub fn next_entry(&mut self) -> Result<Option<(K::Key, K::Data)>, BTreeError> {
        loop {
            if let Some(entry) = self.current_entries.as_mut().and_then(VecDeque::pop_front) {
                return Ok(Some(entry));
            }
            if self.current_entries.is_some() {
                // Current leaf exhausted; move to the next one
                let next = self.tree.read_descriptor(self.current_node)?.f_link;
                self.current_node = next;
                self.current_index = 0;
                self.current_entries = None;
            }
            if self.current_node == 0 {
                return Ok(None);
            }

            self.visited += 1;
            if self.visited > self.tree.header.total_nodes {
                return Err(BTreeError::ConsistencyFault(
                    "leaf chain does not terminate".to_string(),
                ));
            }
            self.load_leaf()?;
        }
    }

    fn load_leaf(&mut self) -> Result<(), BTreeError> {
        let number = self.current_node;
        let (node, descriptor) = self.tree.load_tree_node(number)?;
        if descriptor.kind != NodeKind::Leaf {
            return Err(BTreeError::ConsistencyFault(format!(
                "node {number} in the leaf chain is an index node"
            )));
        }

        let mut entries = VecDeque::with_capacity(node.num_records());
        for index in self.current_index..node.num_records() {
            let key = self.tree.keys.read_key(node.key(index).at(number)?)?;
            let data = self.tree.keys.read_data(node.data(index).at(number)?)?;
            entries.push_back((key, data));
        }
        self.current_entries = Some(entries);
        Ok(())
    }
}
