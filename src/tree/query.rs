use std::collections::HashMap;

use serde::Serialize;

use super::NestedSet;
use crate::store::{Field, Filter, Order, Query, TreeStore};
use crate::types::{Node, NodeId, Result, RootId, TreeError};

/// Rows covered by [`NestedSet::flatten`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListScope {
    /// Every placed node of the table.
    All,
    /// Descendants of one node, the node itself excluded.
    Descendants(NodeId),
}

/// One row of a flattened listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    /// Structural fields of the row.
    pub node: Node,
    /// Indentation depth below the top of its tree.
    pub depth: usize,
}

impl<S: TreeStore> NestedSet<S> {
    /// Children of `id` ordered by left bound: direct children only, or every
    /// descendant.
    pub fn children(&self, id: NodeId, direct: bool) -> Result<Vec<Node>> {
        if direct {
            let filter = Filter::all().eq(Field::Parent, id);
            return self.store.find(&self.ordered(filter));
        }
        let Some((left, right, root)) = self.placed(id)? else {
            return Ok(Vec::new());
        };
        let filter = self.in_root(
            Filter::all().gt(Field::Left, left).lt(Field::Right, right),
            root,
        );
        self.store.find(&self.ordered(filter))
    }

    /// Number of direct children, or of all descendants computed from the
    /// interval width.
    pub fn child_count(&self, id: NodeId, direct: bool) -> Result<u64> {
        let node = self.node(id)?;
        if direct {
            return self.store.count(&Filter::all().eq(Field::Parent, id));
        }
        let Some((left, right)) = node.bounds() else {
            return Ok(0);
        };
        let inner = right - left - 1;
        if inner < 0 || inner % 2 != 0 {
            return Err(TreeError::corrupt(format!(
                "node {id} has interval ({left}, {right}) of odd width"
            )));
        }
        Ok((inner / 2) as u64)
    }

    /// Nodes sharing the parent of `id`.
    pub fn siblings(&self, id: NodeId, include_self: bool) -> Result<Vec<Node>> {
        let Some(node) = self.find_node(id)? else {
            return Ok(Vec::new());
        };
        // An unplaced row has no siblings, even where its filter would match top-level rows.
        if node.bounds().is_none() {
            return Ok(Vec::new());
        }
        let mut filter = self.sibling_filter(&node);
        if !include_self {
            filter = filter.ne(Field::Id, id);
        }
        self.store.find(&self.ordered(filter))
    }

    /// Siblings of `id` to its left, nearest last.
    pub fn prev_siblings(&self, id: NodeId, include_self: bool) -> Result<Vec<Node>> {
        match self.find_node(id)? {
            Some(node) => self.prev_siblings_of(&node, include_self),
            None => Ok(Vec::new()),
        }
    }

    /// Siblings of `id` to its right, nearest first.
    pub fn next_siblings(&self, id: NodeId, include_self: bool) -> Result<Vec<Node>> {
        match self.find_node(id)? {
            Some(node) => self.next_siblings_of(&node, include_self),
            None => Ok(Vec::new()),
        }
    }

    /// The sibling whose interval ends right before `id` starts.
    pub fn prev_sibling(&self, id: NodeId) -> Result<Option<Node>> {
        let Some((left, _, root)) = self.placed(id)? else {
            return Ok(None);
        };
        let filter = self.in_root(Filter::all().eq(Field::Right, left - 1), root);
        self.store.find_one(&self.query(filter))
    }

    /// The sibling whose interval starts right after `id` ends.
    pub fn next_sibling(&self, id: NodeId) -> Result<Option<Node>> {
        let Some((_, right, root)) = self.placed(id)? else {
            return Ok(None);
        };
        let filter = self.in_root(Filter::all().eq(Field::Left, right + 1), root);
        self.store.find_one(&self.query(filter))
    }

    /// The node referenced by the stored parent pointer of `id`.
    pub fn parent(&self, id: NodeId) -> Result<Option<Node>> {
        match self.find_node(id)?.and_then(|node| node.parent) {
            Some(parent) => self.find_node(parent),
            None => Ok(None),
        }
    }

    /// The tightest interval strictly containing `id`.
    pub fn parent_from_tree(&self, id: NodeId) -> Result<Option<Node>> {
        let Some((left, right, root)) = self.placed(id)? else {
            return Ok(None);
        };
        let filter = self.in_root(
            Filter::all().lt(Field::Left, left).gt(Field::Right, right),
            root,
        );
        let query = self.query(filter).order_by(Field::Left, Order::Desc);
        self.store.find_one(&query)
    }

    /// Ancestors of `id`, top of the tree first.
    pub fn path(&self, id: NodeId) -> Result<Vec<Node>> {
        let Some((left, right, root)) = self.placed(id)? else {
            return Ok(Vec::new());
        };
        let filter = self.in_root(
            Filter::all().lt(Field::Left, left).gt(Field::Right, right),
            root,
        );
        self.store.find(&self.ordered(filter))
    }

    /// Depth of `id`, counted from the intervals rather than the cached level.
    pub fn level(&self, id: NodeId) -> Result<u64> {
        let node = self.node(id)?;
        let Some((left, right)) = node.bounds() else {
            return Ok(0);
        };
        self.store.count(&self.in_root(
            Filter::all().lt(Field::Left, left).gt(Field::Right, right),
            node.root,
        ))
    }

    /// Placed nodes of `scope` in `(root, left)` order, each with its
    /// indentation depth.
    ///
    /// Depth comes from the cached level when the mapping has one; otherwise
    /// it is derived from a per-root stack of open right bounds.
    pub fn flatten(&self, scope: ListScope) -> Result<Vec<ListEntry>> {
        let (nodes, base) = match scope {
            ListScope::All => {
                let mut query = self.query(Filter::all().gt(Field::Left, 0));
                if self.config().has_root() {
                    query = query.order_by(Field::Root, Order::Asc);
                }
                (self.store.find(&query.order_by(Field::Left, Order::Asc))?, 0)
            }
            ListScope::Descendants(id) => {
                let base = match self.find_node(id)? {
                    Some(node) => node.level.unwrap_or(0) + 1,
                    None => return Ok(Vec::new()),
                };
                (self.children(id, false)?, base)
            }
        };

        let cached = self.config().has_level();
        let mut open: HashMap<Option<RootId>, Vec<i64>> = HashMap::new();
        let entries = nodes
            .into_iter()
            .map(|node| {
                let depth = match (cached, node.level) {
                    (true, Some(level)) => (level - base).max(0) as usize,
                    _ => {
                        let right = node.right.unwrap_or(0);
                        let stack = open.entry(node.root).or_default();
                        while stack.last().is_some_and(|&top| top < right) {
                            stack.pop();
                        }
                        let depth = stack.len();
                        stack.push(right);
                        depth
                    }
                };
                ListEntry { node, depth }
            })
            .collect();
        Ok(entries)
    }

    pub(super) fn prev_siblings_of(&self, node: &Node, include_self: bool) -> Result<Vec<Node>> {
        let Some((left, _)) = node.bounds() else {
            return Ok(Vec::new());
        };
        let filter = if include_self {
            self.sibling_filter(node).le(Field::Left, left)
        } else {
            self.sibling_filter(node).lt(Field::Left, left)
        };
        self.store.find(&self.ordered(filter))
    }

    pub(super) fn next_siblings_of(&self, node: &Node, include_self: bool) -> Result<Vec<Node>> {
        let Some((left, _)) = node.bounds() else {
            return Ok(Vec::new());
        };
        let filter = if include_self {
            self.sibling_filter(node).ge(Field::Left, left)
        } else {
            self.sibling_filter(node).gt(Field::Left, left)
        };
        self.store.find(&self.ordered(filter))
    }

    /// Placed rows under the same parent; a NULL left never compares true.
    fn sibling_filter(&self, node: &Node) -> Filter {
        let filter = Filter::all()
            .eq_opt(Field::Parent, node.parent)
            .ge(Field::Left, 1);
        self.in_root(filter, node.root)
    }

    fn ordered(&self, filter: Filter) -> Query {
        self.query(filter).order_by(Field::Left, Order::Asc)
    }

    /// Bounds and root of `id`; `None` for a missing or unplaced node.
    fn placed(&self, id: NodeId) -> Result<Option<(i64, i64, Option<RootId>)>> {
        Ok(self
            .find_node(id)?
            .and_then(|node| node.bounds().map(|(l, r)| (l, r, node.root))))
    }
}
