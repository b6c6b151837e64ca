#![forbid(unsafe_code)]

//! Nested-set interval maintenance.
//!
//! [`NestedSet`] keeps the `left`/`right`/`root`/`level` encoding of a table
//! consistent while nodes are inserted, moved and removed. Structural
//! operations run inside one store transaction each and either commit
//! completely or leave the table untouched.
//!
//! Callers must not edit the structural columns directly; doing so breaks the
//! encoding for every later query.

mod accessor;
mod mutate;
mod query;
mod remove;
mod repair;
mod shift;

pub use query::{ListEntry, ListScope};
pub use repair::{RepairMode, RepairReport};

use tracing::{debug, error, warn};

use crate::config::TreeConfig;
use crate::store::{Field, TreeStore};
use crate::types::Result;

/// Interval-maintenance engine bound to one store and its field mapping.
pub struct NestedSet<S> {
    store: S,
}

impl<S: TreeStore> NestedSet<S> {
    /// Binds the engine to `store`; the store's mapping is used for every call.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Releases the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Field mapping in effect.
    pub fn config(&self) -> &TreeConfig {
        self.store.config()
    }

    /// Every structural field the mapping maintains, parent included.
    fn tree_fields(&self) -> Vec<Field> {
        let config = self.config();
        let mut fields = vec![Field::Parent, Field::Left, Field::Right];
        if config.has_root() {
            fields.push(Field::Root);
        }
        if config.has_level() {
            fields.push(Field::Level);
        }
        fields
    }

    /// Runs `body` in a transaction scope; commits on success and rolls back
    /// on the first error.
    fn transaction<T>(&self, op: &'static str, body: impl FnOnce() -> Result<T>) -> Result<T> {
        self.store.begin()?;
        match body() {
            Ok(value) => match self.store.commit() {
                Ok(()) => {
                    debug!(op, "tree.tx.commit");
                    Ok(value)
                }
                Err(err) => {
                    warn!(op, error = %err, "tree.tx.commit_failed");
                    self.rollback_quietly(op);
                    Err(err)
                }
            },
            Err(err) => {
                warn!(op, error = %err, "tree.tx.rollback");
                self.rollback_quietly(op);
                Err(err)
            }
        }
    }

    fn rollback_quietly(&self, op: &'static str) {
        if let Err(rollback_err) = self.store.rollback() {
            error!(op, error = %rollback_err, "tree.tx.rollback_failed");
        }
    }
}
