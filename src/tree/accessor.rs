use super::NestedSet;
use crate::store::{Field, Filter, Query, TreeStore};
use crate::types::{Node, NodeId, Result, TreeError};

impl<S: TreeStore> NestedSet<S> {
    /// Loads the structural fields of `id`.
    ///
    /// # Errors
    /// [`TreeError::NotFound`] when no row has this primary key.
    pub fn node(&self, id: NodeId) -> Result<Node> {
        self.find_node(id)?.ok_or(TreeError::NotFound(id))
    }

    /// Loads `id` if it exists.
    pub fn find_node(&self, id: NodeId) -> Result<Option<Node>> {
        self.store.find_one(&self.query(Filter::all().eq(Field::Id, id)))
    }

    /// Wraps `filter` in a query carrying the configured depth hint.
    pub(super) fn query(&self, filter: Filter) -> Query {
        Query::new(filter).depth(self.config().read_depth)
    }
}
