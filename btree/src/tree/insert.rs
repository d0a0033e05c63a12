//! Insertion: in-place insert, node split, separator propagation and
//! height growth.

use crate::keys::KeyOps;
use crate::node::{
    CHILD_POINTER_SIZE, DESCRIPTOR_SIZE, KEY_LENGTH_SIZE, Node, NodeDescriptor, NodeKind, encode_record,
    index_record, max_record_size,
};
use crate::store::Store;

use super::{BTree, BTreeError, MAX_RETRIES, NodeContext, Outcome};

impl<S: Store, K: KeyOps> BTree<'_, S, K> {
    /// Insert a record. Duplicate keys are rejected, never overwritten.
    pub fn insert(&mut self, key: &K::Key, data: &[u8]) -> Result<(), BTreeError> {
        let key_body = self.keys.write_key(key);
        self.check_record_size(&key_body, data.len())?;

        if self.header.root_node == 0 {
            return self.insert_first(&key_body, data);
        }

        for _ in 0..MAX_RETRIES {
            let root = self.header.root_node;
            match self.add_record(root, key, &key_body, data)? {
                Outcome::Done => return Ok(()),
                Outcome::SplitPropagated(sibling) => return self.increase_height(sibling),
                Outcome::RetryWholeOperation(pending) => {
                    if let Some(sibling) = pending {
                        self.increase_height(sibling)?;
                    }
                    tracing::debug!("retrying insert after pre-emptive split");
                }
            }
        }

        Err(BTreeError::ConsistencyFault(format!(
            "insert did not settle after {MAX_RETRIES} retries"
        )))
    }

    fn check_record_size(&self, key_body: &[u8], data_len: usize) -> Result<(), BTreeError> {
        let max_key = usize::from(self.header.max_key_length);
        if key_body.len() > max_key {
            return Err(BTreeError::KeyTooLong {
                len: key_body.len(),
                max: max_key,
            });
        }
        let max_record = max_record_size(self.node_size());
        let len = KEY_LENGTH_SIZE + key_body.len() + data_len.max(CHILD_POINTER_SIZE);
        if len > max_record {
            return Err(BTreeError::RecordTooLarge {
                len,
                max: max_record,
            });
        }
        Ok(())
    }

    /// Start an empty tree with a single root leaf.
    fn insert_first(&mut self, key_body: &[u8], data: &[u8]) -> Result<(), BTreeError> {
        let number = self.get_new_node()?;
        let mut leaf = Node::new(number, self.node_size(), &NodeDescriptor::new(NodeKind::Leaf, 1));
        leaf.insert_record(0, &encode_record(key_body, data))
            .at(number)?;
        self.store_node(&leaf)?;

        self.header.root_node = number;
        self.header.first_leaf_node = number;
        self.header.last_leaf_node = number;
        self.header.tree_depth = 1;
        self.header.leaf_records = 1;
        self.persist_header()?;
        tracing::debug!(root = number, "created root leaf");
        Ok(())
    }

    fn add_record(
        &mut self,
        number: u32,
        key: &K::Key,
        key_body: &[u8],
        data: &[u8],
    ) -> Result<Outcome, BTreeError> {
        let (mut node, descriptor) = self.load_tree_node(number)?;
        let position = self.locate(&node, key)?;
        if position.exact {
            return Err(BTreeError::AlreadyExists);
        }

        if descriptor.kind == NodeKind::Leaf {
            let record = encode_record(key_body, data);
            let outcome = self.place_record(node, &descriptor, position.index, &record)?;
            self.header.leaf_records += 1;
            self.persist_header()?;
            return Ok(outcome);
        }

        let slot = match position.floor() {
            Some(slot) => slot,
            None => {
                // The key becomes the first key of the leftmost subtree, so
                // this node's first separator must follow it down.
                let separator = index_record(key_body, node.child(0).at(number)?);
                if !node.can_replace(0, &separator) {
                    let sibling = self.split_half(&mut node, &descriptor)?;
                    self.store_node(&node)?;
                    return Ok(Outcome::RetryWholeOperation(Some(sibling.number())));
                }
                node.replace_record(0, &separator).at(number)?;
                self.store_node(&node)?;
                0
            }
        };

        let child = node.child(slot).at(number)?;
        match self.add_record(child, key, key_body, data)? {
            Outcome::Done => Ok(Outcome::Done),
            Outcome::SplitPropagated(sibling) => self.insert_separator(number, sibling),
            Outcome::RetryWholeOperation(None) => Ok(Outcome::RetryWholeOperation(None)),
            Outcome::RetryWholeOperation(Some(sibling)) => {
                Ok(self.insert_separator(number, sibling)?.retried())
            }
        }
    }

    /// Link a freshly split `sibling` into index node `number`.
    pub(crate) fn insert_separator(&mut self, number: u32, sibling: u32) -> Result<Outcome, BTreeError> {
        let key_body = self.first_key(sibling)?;
        let key = self.keys.read_key(&key_body)?;

        let (node, descriptor) = self.load_tree_node(number)?;
        let position = self.locate(&node, &key)?;
        if position.exact {
            return Err(BTreeError::ConsistencyFault(format!(
                "node {number} already has a separator for new node {sibling}"
            )));
        }
        self.place_record(node, &descriptor, position.index, &index_record(&key_body, sibling))
    }

    /// Insert `record` at `index`, splitting the node if it is full.
    ///
    /// The split point is chosen before anything is written, so a record
    /// that cannot be placed leaves the tree untouched.
    fn place_record(
        &mut self,
        mut node: Node,
        descriptor: &NodeDescriptor,
        index: usize,
        record: &[u8],
    ) -> Result<Outcome, BTreeError> {
        if node.free_space() >= record.len() + 2 {
            node.insert_record(index, record).at(node.number())?;
            self.store_node(&node)?;
            return Ok(Outcome::Done);
        }

        let mut sizes = (0..node.num_records())
            .map(|i| node.record(i).map(<[u8]>::len))
            .collect::<Result<Vec<_>, _>>()
            .at(node.number())?;
        sizes.insert(index, record.len());

        // Prefer the by-count split, moving off it only as far as needed
        let kept = node.num_records() / 2;
        let preferred = kept + usize::from(index < kept);
        let capacity = record_area(self.node_size());
        let left_count = choose_split(&sizes, capacity, preferred).ok_or_else(|| {
            BTreeError::ConsistencyFault(format!(
                "node {} has no split point that fits a {}-byte record",
                node.number(),
                record.len()
            ))
        })?;

        let goes_left = index < left_count;
        let at = if goes_left { left_count - 1 } else { left_count };
        let mut sibling = self.split_node(&mut node, descriptor, at)?;
        if goes_left {
            node.insert_record(index, record).at(node.number())?;
        } else {
            sibling
                .insert_record(index - at, record)
                .at(sibling.number())?;
        }
        self.store_node(&node)?;
        self.store_node(&sibling)?;
        Ok(Outcome::SplitPropagated(sibling.number()))
    }

    /// Split `node` by count ahead of a separator rewrite that does not fit.
    pub(crate) fn split_half(
        &mut self,
        node: &mut Node,
        descriptor: &NodeDescriptor,
    ) -> Result<Node, BTreeError> {
        let count = node.num_records();
        if count < 2 {
            return Err(BTreeError::ConsistencyFault(format!(
                "node {} cannot split with {count} records",
                node.number()
            )));
        }
        self.split_node(node, descriptor, count / 2)
    }

    /// Move records `at..` of `node` into a new right-hand sibling.
    ///
    /// The sibling is linked into the chain and written; `node` is updated in
    /// memory only and must be stored by the caller.
    pub(crate) fn split_node(
        &mut self,
        node: &mut Node,
        descriptor: &NodeDescriptor,
        at: usize,
    ) -> Result<Node, BTreeError> {
        let count = node.num_records();
        if count == 0 || at > count {
            return Err(BTreeError::ConsistencyFault(format!(
                "node {} cannot split at {at} with {count} records",
                node.number()
            )));
        }
        let moved = node.split_off(at).at(node.number())?;

        let number = self.get_new_node()?;
        let mut sibling = Node::new(
            number,
            self.node_size(),
            &NodeDescriptor {
                f_link: descriptor.f_link,
                b_link: node.number(),
                ..NodeDescriptor::new(descriptor.kind, descriptor.height)
            },
        );
        for (index, record) in moved.iter().enumerate() {
            sibling.insert_record(index, record).at(number)?;
        }
        self.store_node(&sibling)?;

        if descriptor.f_link != 0 {
            let mut next = self.read_descriptor(descriptor.f_link)?;
            next.b_link = number;
            self.write_descriptor(descriptor.f_link, &next)?;
        }
        let mut left = node.descriptor().at(node.number())?;
        left.f_link = number;
        node.set_descriptor(&left);

        if descriptor.kind == NodeKind::Leaf && self.header.last_leaf_node == node.number() {
            self.header.last_leaf_node = number;
            self.persist_header()?;
        }

        tracing::debug!(
            node = node.number(),
            sibling = number,
            height = descriptor.height,
            moved = moved.len(),
            "split node"
        );
        Ok(sibling)
    }

    /// Put a new root above the old root and its new sibling.
    pub(crate) fn increase_height(&mut self, sibling: u32) -> Result<(), BTreeError> {
        let old_root = self.header.root_node;
        let old_key = self.first_key(old_root)?;
        let new_key = self.first_key(sibling)?;

        let height = u8::try_from(self.header.tree_depth + 1).map_err(|_| {
            BTreeError::ConsistencyFault("tree depth exceeds 255 levels".to_string())
        })?;
        let number = self.get_new_node()?;
        let mut root = Node::new(number, self.node_size(), &NodeDescriptor::new(NodeKind::Index, height));
        root.insert_record(0, &index_record(&old_key, old_root))
            .at(number)?;
        root.insert_record(1, &index_record(&new_key, sibling))
            .at(number)?;
        self.store_node(&root)?;

        self.header.root_node = number;
        self.header.tree_depth = u16::from(height);
        self.persist_header()?;
        tracing::debug!(root = number, depth = height, "increased tree height");
        Ok(())
    }
}

/// Bytes available to records and their offset slots in an empty node.
const fn record_area(node_size: usize) -> usize {
    node_size - DESCRIPTOR_SIZE - 2
}

/// Pick how many of `sizes` stay in the left node after a split.
///
/// Each record also takes a 2-byte offset slot. Returns the fitting split
/// closest to `preferred`, keeping both halves non-empty.
fn choose_split(sizes: &[usize], capacity: usize, preferred: usize) -> Option<usize> {
    let total: usize = sizes.iter().map(|size| size + 2).sum();
    let mut left = 0;
    let mut best: Option<usize> = None;
    for (index, size) in sizes.iter().enumerate().take(sizes.len().saturating_sub(1)) {
        left += size + 2;
        let count = index + 1;
        let fits = left <= capacity && total - left <= capacity;
        if fits && best.is_none_or(|b| count.abs_diff(preferred) < b.abs_diff(preferred)) {
            best = Some(count);
        }
    }
    best
}
