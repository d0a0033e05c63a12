//! Removal: record delete, empty-node release and separator repair.

use crate::keys::KeyOps;
use crate::node::{NodeKind, index_record};
use crate::store::Store;

use super::{BTree, BTreeError, MAX_RETRIES, NodeContext, Outcome};

/// Result of one recursive removal step.
struct RemoveStep {
    outcome: Outcome,
    /// The node was emptied and released; its parent must drop its record.
    gone: bool,
}

impl RemoveStep {
    const fn kept(outcome: Outcome) -> Self {
        Self {
            outcome,
            gone: false,
        }
    }
}

impl<S: Store, K: KeyOps> BTree<'_, S, K> {
    /// Remove the record with `key`.
    ///
    /// Emptied nodes go back to the free pool. When a removed key was the
    /// first key of a subtree, separators above it are rewritten to the
    /// subtree's new first key.
    pub fn remove(&mut self, key: &K::Key) -> Result<(), BTreeError> {
        let mut removed = false;
        for _ in 0..MAX_RETRIES {
            let root = self.header.root_node;
            if root == 0 {
                return if removed {
                    Ok(())
                } else {
                    Err(BTreeError::NotFound)
                };
            }

            match self.remove_record(root, key, &mut removed)?.outcome {
                Outcome::Done => return Ok(()),
                Outcome::SplitPropagated(sibling) => return self.increase_height(sibling),
                Outcome::RetryWholeOperation(pending) => {
                    if let Some(sibling) = pending {
                        self.increase_height(sibling)?;
                    }
                    tracing::debug!("retrying remove after pre-emptive split");
                }
            }
        }

        Err(BTreeError::ConsistencyFault(format!(
            "remove did not settle after {MAX_RETRIES} retries"
        )))
    }

    fn remove_record(
        &mut self,
        number: u32,
        key: &K::Key,
        removed: &mut bool,
    ) -> Result<RemoveStep, BTreeError> {
        let (mut node, descriptor) = self.load_tree_node(number)?;
        let position = self.locate(&node, key)?;

        if descriptor.kind == NodeKind::Leaf {
            if !position.exact {
                // A retried removal already took the record out
                return if *removed {
                    Ok(RemoveStep::kept(Outcome::Done))
                } else {
                    Err(BTreeError::NotFound)
                };
            }
            node.remove_record(position.index).at(number)?;
            self.store_node(&node)?;
            *removed = true;
            self.header.leaf_records = self.header.leaf_records.saturating_sub(1);
            self.persist_header()?;

            if node.num_records() == 0 {
                self.remove_node(number)?;
                return Ok(RemoveStep {
                    outcome: Outcome::Done,
                    gone: true,
                });
            }
            return Ok(RemoveStep::kept(Outcome::Done));
        }

        let Some(slot) = position.floor() else {
            return if *removed {
                Ok(RemoveStep::kept(Outcome::Done))
            } else {
                Err(BTreeError::NotFound)
            };
        };
        let child = node.child(slot).at(number)?;
        let below = self.remove_record(child, key, removed)?;

        match below.outcome {
            Outcome::SplitPropagated(sibling) => {
                return Ok(RemoveStep::kept(self.insert_separator(number, sibling)?));
            }
            Outcome::RetryWholeOperation(Some(sibling)) => {
                let outcome = self.insert_separator(number, sibling)?.retried();
                return Ok(RemoveStep::kept(outcome));
            }
            Outcome::RetryWholeOperation(None) => {
                return Ok(RemoveStep::kept(below.outcome));
            }
            Outcome::Done => {}
        }

        // The child may have rewritten links in this node's descriptor
        let (mut node, descriptor) = self.load_tree_node(number)?;

        if below.gone {
            node.remove_record(slot).at(number)?;
            self.store_node(&node)?;
            if node.num_records() == 0 {
                self.remove_node(number)?;
                return Ok(RemoveStep {
                    outcome: Outcome::Done,
                    gone: true,
                });
            }
            return Ok(RemoveStep::kept(Outcome::Done));
        }

        if position.exact {
            let separator = index_record(&self.first_key(child)?, child);
            if !node.can_replace(slot, &separator) {
                let sibling = self.split_half(&mut node, &descriptor)?;
                self.store_node(&node)?;
                return Ok(RemoveStep::kept(Outcome::RetryWholeOperation(Some(
                    sibling.number(),
                ))));
            }
            node.replace_record(slot, &separator).at(number)?;
            self.store_node(&node)?;
            tracing::trace!(node = number, slot, child, "rewrote separator");
        }
        Ok(RemoveStep::kept(Outcome::Done))
    }
}
