#![forbid(unsafe_code)]

//! Identifiers, structural records and the error taxonomy shared by every layer.

use std::fmt;

use serde::Serialize;

use crate::config::ConfigError;

/// Primary key of a row in the host table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct NodeId(pub i64);

/// Identifier of one independent tree when the table stores a forest.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct RootId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for i64 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl From<i64> for RootId {
    fn from(value: i64) -> Self {
        RootId(value)
    }
}

impl From<RootId> for i64 {
    fn from(value: RootId) -> Self {
        value.0
    }
}

/// Structural fields of one row.
///
/// `left`/`right` are `None` (or zero) while the row is a placeholder that has
/// not been positioned in any tree yet. `root` and `level` stay `None` when the
/// corresponding column is not configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Primary key.
    pub id: NodeId,
    /// Stored parent pointer; `None` for the top of a tree.
    pub parent: Option<NodeId>,
    /// Left bound of the node's interval.
    pub left: Option<i64>,
    /// Right bound of the node's interval.
    pub right: Option<i64>,
    /// Root partition the node belongs to.
    pub root: Option<RootId>,
    /// Cached depth below the top of its tree.
    pub level: Option<i64>,
}

impl Node {
    /// Creates a placeholder record with no structural data.
    pub fn placeholder(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            left: None,
            right: None,
            root: None,
            level: None,
        }
    }

    /// Returns `(left, right)` when the node occupies a real interval.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        match (self.left, self.right) {
            (Some(left), Some(right)) if left != 0 && right != 0 => Some((left, right)),
            _ => None,
        }
    }

    /// Whether the node has been positioned in a tree.
    pub fn is_placed(&self) -> bool {
        self.bounds().is_some()
    }

    /// Number of interval slots the node and its descendants occupy.
    pub fn width(&self) -> i64 {
        self.bounds().map_or(2, |(left, right)| right - left + 1)
    }

    /// Whether `other` lies strictly inside this node's interval.
    ///
    /// Root partitions are compared as stored; callers working on a table
    /// without roots see `None == None`.
    pub fn contains(&self, other: &Node) -> bool {
        match (self.bounds(), other.bounds()) {
            (Some((l, r)), Some((ol, or))) => self.root == other.root && l < ol && or < r,
            _ => false,
        }
    }
}

/// Placement of a moved node relative to a destination node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Directly before the destination, sharing its parent.
    PrevSibling,
    /// Directly after the destination, sharing its parent.
    NextSibling,
    /// First child of the destination.
    FirstChild,
    /// Last child of the destination.
    #[default]
    LastChild,
}

/// Where [`crate::tree::NestedSet::move_node`] places a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Relative to an existing node.
    Node {
        /// Destination node.
        id: NodeId,
        /// Placement relative to `id`.
        position: Position,
    },
    /// Top level, appended at the end of the given root partition.
    Root(RootId),
    /// Top level, appended at the end of the node's current root partition.
    OwnRoot,
    /// Top level of a brand-new tree, or the end of the table without roots.
    Top,
}

impl Destination {
    /// Last child of `id`.
    pub fn child_of(id: NodeId) -> Self {
        Destination::Node {
            id,
            position: Position::LastChild,
        }
    }

    /// `id` with an explicit position.
    pub fn at(id: NodeId, position: Position) -> Self {
        Destination::Node { id, position }
    }

    /// Last child of `parent`, or a new tree when there is no parent.
    pub fn from_parent(parent: Option<NodeId>) -> Self {
        parent.map_or(Destination::Top, Destination::child_of)
    }
}

/// Direction used by sibling-relative operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SiblingDirection {
    /// Towards lower bounds.
    Previous,
    /// Towards higher bounds.
    Next,
}

impl fmt::Display for SiblingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiblingDirection::Previous => f.write_str("previous"),
            SiblingDirection::Next => f.write_str("next"),
        }
    }
}

/// Domain-rule violations surfaced to the caller for correction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The destination node does not exist.
    #[error("destination node {0} does not exist")]
    MissingDestination(NodeId),
    /// The destination lies inside the subtree being moved.
    #[error("destination node {destination} is within the subtree of {node}")]
    DestinationInsideSource {
        /// Node being moved.
        node: NodeId,
        /// Requested destination.
        destination: NodeId,
    },
    /// The destination has no interval yet.
    #[error("destination node {0} has not been placed in a tree")]
    DestinationNotPlaced(NodeId),
    /// No sibling exists in the requested direction.
    #[error("node {id} has no {direction} sibling")]
    NoSibling {
        /// Node that was asked to move.
        id: NodeId,
        /// Requested direction.
        direction: SiblingDirection,
    },
}

/// Errors produced by the tree engine.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Referenced node id does not exist.
    #[error("node {0} not found")]
    NotFound(NodeId),
    /// Domain-rule violation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Underlying read/write/transaction step failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// Internally detected invariant violation.
    #[error("corrupt tree: {0}")]
    Corrupt(String),
    /// Invalid field mapping.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TreeError {
    /// Wraps a backend error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TreeError::Storage(Box::new(err))
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        TreeError::Corrupt(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TreeError>;
