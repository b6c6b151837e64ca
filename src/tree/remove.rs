use tracing::debug;

use super::NestedSet;
use crate::store::{Assignment, Field, Filter, TreeStore};
use crate::types::{Node, NodeId, Result};

impl<S: TreeStore> NestedSet<S> {
    /// Removes `id` from the table and closes the gap it leaves.
    ///
    /// With `delete_children` the whole subtree is deleted. Otherwise the
    /// direct children are promoted to the removed node's parent and its
    /// descendants move up one level.
    pub fn remove_from_tree(&self, id: NodeId, delete_children: bool) -> Result<()> {
        self.transaction("remove", || {
            let node = self.node(id)?;
            self.remove_loaded(&node, delete_children)
        })
    }

    /// Same as [`NestedSet::remove_from_tree`] for a node the caller already
    /// loaded.
    pub fn remove_loaded(&self, node: &Node, delete_children: bool) -> Result<()> {
        let Some((left, right)) = node.bounds() else {
            let rows = self.delete_row(node.id)?;
            debug!(node = node.id.0, rows, "tree.remove.placeholder");
            return Ok(());
        };
        let tree_size = right - left + 1;
        debug!(
            node = node.id.0,
            left,
            right,
            delete_children,
            "tree.remove.begin"
        );
        self.transaction("remove", || {
            if delete_children {
                let rows = if tree_size > 2 {
                    self.delete_range(left, right, node.root)?
                } else {
                    self.delete_row(node.id)?
                };
                self.shift(left, -tree_size, node.root)?;
                debug!(node = node.id.0, rows, "tree.remove.subtree");
                return Ok(());
            }

            self.delete_row(node.id)?;
            if tree_size > 2 {
                let promoted = self.store.update_all(
                    &[Assignment::Set(Field::Parent, node.parent.map(|p| p.0))],
                    &self.in_root(Filter::all().eq(Field::Parent, node.id), node.root),
                )?;
                self.shift_range(left, right, -1, node.root, node.root, -1)?;
                debug!(node = node.id.0, promoted, "tree.remove.promote");
            }
            self.shift(right, -2, node.root)
        })
    }
}
