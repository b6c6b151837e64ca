use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::NestedSet;
use crate::store::{Assignment, Field, Filter, Order, TreeStore};
use crate::types::{Destination, NodeId, Result, RootId};

/// Which half of the encoding [`NestedSet::repair`] trusts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Rebuild intervals, roots and levels from parent pointers.
    Tree,
    /// Rebuild parent pointers from intervals.
    Parent,
}

impl fmt::Display for RepairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairMode::Tree => f.write_str("tree"),
            RepairMode::Parent => f.write_str("parent"),
        }
    }
}

/// Outcome of a repair run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Nodes given a fresh interval.
    pub placed: usize,
    /// Parent pointers that changed.
    pub parents_rewritten: usize,
    /// Nodes left unplaced because their parent chain never reaches a top node.
    pub orphans: Vec<NodeId>,
    /// Placeholders ignored by a parent pass.
    pub skipped: usize,
}

impl<S: TreeStore> NestedSet<S> {
    /// Rebuilds one half of the encoding from the other.
    ///
    /// The run is a single transaction; a failure leaves the table as it was.
    /// Running the same mode twice yields the same tree.
    pub fn repair(&self, mode: RepairMode) -> Result<RepairReport> {
        info!(%mode, "tree.repair.begin");
        let report = self.transaction("repair", || match mode {
            RepairMode::Tree => self.rebuild_intervals(),
            RepairMode::Parent => self.rebuild_parents(),
        })?;
        info!(
            %mode,
            placed = report.placed,
            parents_rewritten = report.parents_rewritten,
            orphans = report.orphans.len(),
            skipped = report.skipped,
            "tree.repair.done"
        );
        Ok(report)
    }

    fn rebuild_intervals(&self) -> Result<RepairReport> {
        let config = self.config();
        let mut wipe = vec![
            Assignment::Set(Field::Left, None),
            Assignment::Set(Field::Right, None),
        ];
        if config.has_root() {
            wipe.push(Assignment::Set(Field::Root, None));
        }
        if config.has_level() {
            wipe.push(Assignment::Set(Field::Level, None));
        }
        let wiped = self.store.update_all(&wipe, &Filter::all())?;
        debug!(rows = wiped, "tree.repair.wipe");

        let nodes = self
            .store
            .find(&self.query(Filter::all()).order_by(Field::Id, Order::Asc))?;
        let known: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
        let mut children: HashMap<Option<NodeId>, Vec<NodeId>> = HashMap::new();
        for node in &nodes {
            children.entry(node.parent).or_default().push(node.id);
        }

        let mut report = RepairReport::default();
        let mut visited = HashSet::with_capacity(nodes.len());
        let mut queue: VecDeque<(NodeId, Option<NodeId>)> = children
            .get(&None)
            .into_iter()
            .flatten()
            .map(|&id| (id, None))
            .collect();
        while let Some((id, parent)) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            self.move_node(id, Destination::from_parent(parent))?;
            report.placed += 1;
            if let Some(kids) = children.get(&Some(id)) {
                queue.extend(kids.iter().map(|&kid| (kid, Some(id))));
            }
        }

        for node in &nodes {
            if visited.contains(&node.id) {
                continue;
            }
            let dangling = node.parent.is_some_and(|p| !known.contains(&p));
            warn!(
                node = node.id.0,
                parent = node.parent.map(|p| p.0),
                dangling,
                "tree.repair.orphan"
            );
            report.orphans.push(node.id);
        }
        Ok(report)
    }

    fn rebuild_parents(&self) -> Result<RepairReport> {
        let mut query = self.query(Filter::all().gt(Field::Left, 0));
        if self.config().has_root() {
            query = query.order_by(Field::Root, Order::Asc);
        }
        let placed = self.store.find(&query.order_by(Field::Left, Order::Asc))?;
        let total = self.store.count(&Filter::all())?;

        let mut report = RepairReport {
            skipped: (total as usize).saturating_sub(placed.len()),
            ..RepairReport::default()
        };
        let mut open: HashMap<Option<RootId>, Vec<(i64, NodeId)>> = HashMap::new();
        for mut node in placed {
            let right = node.right.unwrap_or(0);
            let stack = open.entry(node.root).or_default();
            while stack.last().is_some_and(|&(top, _)| top < right) {
                stack.pop();
            }
            let derived = stack.last().map(|&(_, id)| id);
            stack.push((right, node.id));
            if derived != node.parent {
                debug!(
                    node = node.id.0,
                    stored = node.parent.map(|p| p.0),
                    derived = derived.map(|p| p.0),
                    "tree.repair.parent"
                );
                node.parent = derived;
                self.store.save(&node, &[Field::Parent])?;
                report.parents_rewritten += 1;
            }
        }
        Ok(report)
    }
}
