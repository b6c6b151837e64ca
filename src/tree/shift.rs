use tracing::debug;

use super::NestedSet;
use crate::store::{Assignment, Field, Filter, TreeStore};
use crate::types::{NodeId, Result, RootId};

impl<S: TreeStore> NestedSet<S> {
    /// Adds `delta` to every bound `>= first` in `root`.
    ///
    /// Left and right bounds are updated by two separate range updates: a node
    /// whose right bound is in range but whose left bound is not (an ancestor of
    /// the gap) only has its right bound moved.
    pub(crate) fn shift(&self, first: i64, delta: i64, root: Option<RootId>) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let lefts = self.store.update_all(
            &[Assignment::Offset(Field::Left, delta)],
            &self.in_root(Filter::all().ge(Field::Left, first), root),
        )?;
        let rights = self.store.update_all(
            &[Assignment::Offset(Field::Right, delta)],
            &self.in_root(Filter::all().ge(Field::Right, first), root),
        )?;
        debug!(
            first,
            delta,
            root = root.map(|r| r.0),
            lefts,
            rights,
            "tree.shift"
        );
        Ok(())
    }

    /// Moves every interval inside `[first, last]` of `source_root` by `delta`,
    /// reassigning it to `dest_root` and adjusting cached levels by
    /// `level_delta`, all in one statement.
    pub(crate) fn shift_range(
        &self,
        first: i64,
        last: i64,
        delta: i64,
        source_root: Option<RootId>,
        dest_root: Option<RootId>,
        level_delta: i64,
    ) -> Result<()> {
        let config = self.config();
        let mut assignments = vec![
            Assignment::Offset(Field::Left, delta),
            Assignment::Offset(Field::Right, delta),
        ];
        if config.has_root() {
            assignments.push(Assignment::Set(Field::Root, dest_root.map(|r| r.0)));
        }
        if config.has_level() && level_delta != 0 {
            assignments.push(Assignment::Offset(Field::Level, level_delta));
        }
        let filter = self.in_root(
            Filter::all().ge(Field::Left, first).le(Field::Right, last),
            source_root,
        );
        let rows = self.store.update_all(&assignments, &filter)?;
        debug!(
            first,
            last,
            delta,
            level_delta,
            source_root = source_root.map(|r| r.0),
            dest_root = dest_root.map(|r| r.0),
            rows,
            "tree.shift_range"
        );
        Ok(())
    }

    /// Largest value of `field` among rows matching `filter`, or 0 for none.
    pub(crate) fn max_value(&self, field: Field, filter: &Filter) -> Result<i64> {
        Ok(self.store.max_of(field, filter)?.unwrap_or(0))
    }

    /// Largest right bound in `root` (or the whole table without roots).
    pub(crate) fn max_right(&self, root: Option<RootId>) -> Result<i64> {
        self.max_value(Field::Right, &self.in_root(Filter::all(), root))
    }

    /// Deletes every row whose interval lies inside `[first, last]` of `root`.
    pub(crate) fn delete_range(&self, first: i64, last: i64, root: Option<RootId>) -> Result<usize> {
        self.store.delete_all(&self.in_root(
            Filter::all().ge(Field::Left, first).le(Field::Right, last),
            root,
        ))
    }

    /// Deletes one row.
    pub(crate) fn delete_row(&self, id: NodeId) -> Result<usize> {
        self.store.delete_all(&Filter::all().eq(Field::Id, id))
    }

    /// Adds `root = root` when the table is partitioned by root.
    pub(super) fn in_root(&self, filter: Filter, root: Option<RootId>) -> Filter {
        if self.config().has_root() {
            filter.eq_opt(Field::Root, root)
        } else {
            filter
        }
    }
}
