#![forbid(unsafe_code)]

//! Storage capability contract consumed by the tree engine.
//!
//! The engine never renders queries itself. It describes reads and writes with the
//! small value language in this module ([`Filter`], [`Assignment`], [`Query`])
//! and a [`TreeStore`] turns them into backend statements. Arithmetic
//! assignments must be evaluated by the backend in a single statement so that
//! shifts stay correct when several of them run inside one transaction.

pub mod sqlite;

use crate::config::TreeConfig;
use crate::types::{Node, NodeId, Result};

pub use sqlite::SqliteStore;

/// Structural field of the host table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// Primary key.
    Id,
    /// Parent pointer.
    Parent,
    /// Left bound.
    Left,
    /// Right bound.
    Right,
    /// Root partition.
    Root,
    /// Cached depth.
    Level,
}

/// Comparison operator used in a [`Condition`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cmp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Cmp {
    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
        }
    }
}

/// One term of a conjunctive [`Filter`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// `field <op> value`
    Compare(Field, Cmp, i64),
    /// `field IS NULL`
    IsNull(Field),
}

/// Conjunction of conditions; the empty filter matches every row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Filter matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Conditions in insertion order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Adds `field <cmp> value`.
    pub fn cmp(mut self, field: Field, cmp: Cmp, value: impl Into<i64>) -> Self {
        self.conditions
            .push(Condition::Compare(field, cmp, value.into()));
        self
    }

    /// Adds `field = value`.
    pub fn eq(self, field: Field, value: impl Into<i64>) -> Self {
        self.cmp(field, Cmp::Eq, value)
    }

    /// Adds `field = value`, or `field IS NULL` for `None`.
    pub fn eq_opt<V: Into<i64>>(mut self, field: Field, value: Option<V>) -> Self {
        match value {
            Some(value) => self.eq(field, value),
            None => {
                self.conditions.push(Condition::IsNull(field));
                self
            }
        }
    }

    /// Adds `field <> value`.
    pub fn ne(self, field: Field, value: impl Into<i64>) -> Self {
        self.cmp(field, Cmp::Ne, value)
    }

    /// Adds `field < value`.
    pub fn lt(self, field: Field, value: impl Into<i64>) -> Self {
        self.cmp(field, Cmp::Lt, value)
    }

    /// Adds `field <= value`.
    pub fn le(self, field: Field, value: impl Into<i64>) -> Self {
        self.cmp(field, Cmp::Le, value)
    }

    /// Adds `field > value`.
    pub fn gt(self, field: Field, value: impl Into<i64>) -> Self {
        self.cmp(field, Cmp::Gt, value)
    }

    /// Adds `field >= value`.
    pub fn ge(self, field: Field, value: impl Into<i64>) -> Self {
        self.cmp(field, Cmp::Ge, value)
    }
}

/// Column write performed by [`TreeStore::update_all`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Assignment {
    /// `field = value` (`None` writes NULL).
    Set(Field, Option<i64>),
    /// `field = field + delta`, evaluated by the backend.
    Offset(Field, i64),
}

/// Sort direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Order {
    /// Ascending; NULLs first.
    Asc,
    /// Descending.
    Desc,
}

/// Read request: filter, ordering, optional limit and the configured depth hint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    /// Row filter.
    pub filter: Filter,
    /// Sort keys, most significant first.
    pub order: Vec<(Field, Order)>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Association depth hint taken from [`TreeConfig::read_depth`].
    pub depth: i32,
}

impl Query {
    /// Query over `filter` with no ordering.
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Appends a sort key.
    pub fn order_by(mut self, field: Field, order: Order) -> Self {
        self.order.push((field, order));
        self
    }

    /// Caps the number of rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the association depth hint.
    pub fn depth(mut self, depth: i32) -> Self {
        self.depth = depth;
        self
    }
}

/// Narrow storage contract the engine is written against.
///
/// `begin`/`commit`/`rollback` must nest: an inner `begin` opens a nested scope
/// whose rollback leaves the outer scope intact. Implementations must serialize
/// structural writers against the same table for the duration of the outermost
/// scope, since the engine reads bounds and then issues range updates keyed on
/// them.
pub trait TreeStore {
    /// Field mapping the store was opened with.
    fn config(&self) -> &TreeConfig;

    /// Rows matching `query`, structural fields only.
    fn find(&self, query: &Query) -> Result<Vec<Node>>;

    /// First row matching `query`.
    fn find_one(&self, query: &Query) -> Result<Option<Node>> {
        let mut rows = self.find(&query.clone().limit(1))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Number of rows matching `filter`.
    fn count(&self, filter: &Filter) -> Result<u64>;

    /// Applies `assignments` to every row matching `filter`; returns rows touched.
    fn update_all(&self, assignments: &[Assignment], filter: &Filter) -> Result<usize>;

    /// Deletes every row matching `filter`; returns rows removed.
    fn delete_all(&self, filter: &Filter) -> Result<usize>;

    /// Inserts a row with no interval and no parent, returning its id.
    fn insert_placeholder(&self) -> Result<NodeId>;

    /// Writes the listed fields of `node` to its row.
    fn save(&self, node: &Node, fields: &[Field]) -> Result<()>;

    /// Largest value of `field` among rows matching `filter`.
    fn max_of(&self, field: Field, filter: &Filter) -> Result<Option<i64>>;

    /// Opens a (possibly nested) transaction scope.
    fn begin(&self) -> Result<()>;

    /// Commits the innermost scope.
    fn commit(&self) -> Result<()>;

    /// Discards the innermost scope.
    fn rollback(&self) -> Result<()>;
}

impl<S: TreeStore + ?Sized> TreeStore for &S {
    fn config(&self) -> &TreeConfig {
        (**self).config()
    }

    fn find(&self, query: &Query) -> Result<Vec<Node>> {
        (**self).find(query)
    }

    fn find_one(&self, query: &Query) -> Result<Option<Node>> {
        (**self).find_one(query)
    }

    fn count(&self, filter: &Filter) -> Result<u64> {
        (**self).count(filter)
    }

    fn update_all(&self, assignments: &[Assignment], filter: &Filter) -> Result<usize> {
        (**self).update_all(assignments, filter)
    }

    fn delete_all(&self, filter: &Filter) -> Result<usize> {
        (**self).delete_all(filter)
    }

    fn insert_placeholder(&self) -> Result<NodeId> {
        (**self).insert_placeholder()
    }

    fn save(&self, node: &Node, fields: &[Field]) -> Result<()> {
        (**self).save(node, fields)
    }

    fn max_of(&self, field: Field, filter: &Filter) -> Result<Option<i64>> {
        (**self).max_of(field, filter)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }
}
