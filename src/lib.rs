//! Nested-set (interval encoded) tree maintenance over a relational table.
//!
//! [`NestedSet`] keeps the `left`/`right`/`root`/`level` columns of a table
//! consistent while nodes are moved, removed and repaired. Storage is reached
//! through the [`store::TreeStore`] contract; [`SqliteStore`] is the bundled
//! implementation.

#![warn(missing_docs)]

pub mod admin;
pub mod config;
pub mod store;
pub mod tree;
pub mod types;

pub use config::{ConfigError, TreeConfig};
pub use store::{SqliteStore, TreeStore};
pub use tree::{ListEntry, ListScope, NestedSet, RepairMode, RepairReport};
pub use types::{
    Destination, Node, NodeId, Position, Result, RootId, SiblingDirection, TreeError,
    ValidationError,
};
