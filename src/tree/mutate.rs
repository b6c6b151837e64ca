use tracing::debug;

use super::NestedSet;
use crate::store::{Field, Filter, TreeStore};
use crate::types::{
    Destination, Node, NodeId, Position, Result, RootId, SiblingDirection, ValidationError,
};

impl<S: TreeStore> NestedSet<S> {
    /// Moves `id` and its whole subtree to `destination`.
    ///
    /// A placeholder row (no interval yet) is inserted as a new leaf. Opening
    /// the destination gap, relocating the subtree and closing the source gap
    /// happen in one transaction.
    ///
    /// # Errors
    /// * [`crate::TreeError::NotFound`] if `id` does not exist.
    /// * [`ValidationError::MissingDestination`] if the destination node does not exist.
    /// * [`ValidationError::DestinationInsideSource`] if the destination lies in
    ///   the moved subtree (including `id` itself).
    /// * [`ValidationError::DestinationNotPlaced`] if the destination has no interval.
    pub fn move_node(&self, id: NodeId, destination: Destination) -> Result<()> {
        self.transaction("move", || {
            // Read under the write lock so another connection cannot shift it first.
            let node = self.node(id)?;
            debug!(
                node = id.0,
                ?destination,
                placed = node.is_placed(),
                "tree.move.begin"
            );
            self.relocate(&node, destination)
        })
    }

    /// Inserts a new row and places it at `destination`.
    ///
    /// The insert and the placement share one transaction, so a rejected
    /// destination leaves no row behind.
    pub fn insert(&self, destination: Destination) -> Result<NodeId> {
        self.transaction("insert", || {
            let id = self.store.insert_placeholder()?;
            debug!(node = id.0, "tree.insert");
            self.move_node(id, destination)?;
            Ok(id)
        })
    }

    /// Moves `id` before its `steps`-th previous sibling (clamped to the
    /// first sibling).
    pub fn move_up(&self, id: NodeId, steps: usize) -> Result<()> {
        let node = self.node(id)?;
        let mut previous = self.prev_siblings_of(&node, false)?;
        previous.reverse();
        let target = pick_sibling(&node, &previous, steps, SiblingDirection::Previous)?;
        self.move_node(id, Destination::at(target, Position::PrevSibling))
    }

    /// Moves `id` after its `steps`-th next sibling (clamped to the last
    /// sibling).
    pub fn move_down(&self, id: NodeId, steps: usize) -> Result<()> {
        let node = self.node(id)?;
        let next = self.next_siblings_of(&node, false)?;
        let target = pick_sibling(&node, &next, steps, SiblingDirection::Next)?;
        self.move_node(id, Destination::at(target, Position::NextSibling))
    }

    fn relocate(&self, old: &Node, destination: Destination) -> Result<()> {
        let config = self.config();
        let placed = old.bounds();
        let (mut left, mut right) = placed.unwrap_or((1, 2));
        let tree_size = right - left + 1;
        let level_at = |depth: i64| config.has_level().then_some(depth);
        let mut moved = old.clone();

        let start = match destination {
            Destination::Node { id, position } => {
                let target = self
                    .find_node(id)?
                    .ok_or(ValidationError::MissingDestination(id))?;
                let (target_left, target_right) = target
                    .bounds()
                    .ok_or(ValidationError::DestinationNotPlaced(id))?;
                let same_root = !config.has_root() || old.root == target.root;
                if placed.is_some()
                    && same_root
                    && target_left >= left
                    && target_right <= right
                {
                    return Err(ValidationError::DestinationInsideSource {
                        node: old.id,
                        destination: id,
                    }
                    .into());
                }

                let target_level = target.level.unwrap_or(0);
                let start = match position {
                    Position::PrevSibling => {
                        moved.parent = target.parent;
                        moved.level = level_at(target_level);
                        target_left
                    }
                    Position::NextSibling => {
                        moved.parent = target.parent;
                        moved.level = level_at(target_level);
                        target_right + 1
                    }
                    Position::FirstChild => {
                        moved.parent = Some(target.id);
                        moved.level = level_at(target_level + 1);
                        target_left + 1
                    }
                    Position::LastChild => {
                        moved.parent = Some(target.id);
                        moved.level = level_at(target_level + 1);
                        target_right
                    }
                };
                moved.root = target.root;

                self.shift(start, tree_size, target.root)?;
                // The gap may have pushed our own interval; storage already has it.
                if placed.is_some() && same_root {
                    if left >= start {
                        left += tree_size;
                    }
                    if right >= start {
                        right += tree_size;
                    }
                }
                start
            }
            _ if !config.has_root() => {
                moved.parent = None;
                moved.level = level_at(0);
                self.max_right(None)? + 1
            }
            Destination::Root(root) => {
                moved.root = Some(root);
                moved.parent = None;
                moved.level = level_at(0);
                self.max_right(Some(root))? + 1
            }
            Destination::OwnRoot if old.root.is_some() => {
                moved.parent = None;
                moved.level = level_at(0);
                self.max_right(old.root)? + 1
            }
            Destination::OwnRoot | Destination::Top => {
                let root = RootId(self.max_value(Field::Root, &Filter::all())? + 1);
                moved.root = Some(root);
                moved.parent = None;
                moved.level = level_at(0);
                1
            }
        };

        let diff = start - left;
        match placed {
            Some(_) if tree_size > 2 => {
                let level_delta = match (moved.level, old.level) {
                    (Some(new_level), old_level) => new_level - old_level.unwrap_or(0),
                    (None, _) => 0,
                };
                self.shift_range(left, right, diff, old.root, moved.root, level_delta)?;
                self.store.save(&moved, &[Field::Parent])?;
            }
            _ => {
                moved.left = Some(left + diff);
                moved.right = Some(right + diff);
                self.store.save(&moved, &self.tree_fields())?;
            }
        }

        if placed.is_some() {
            self.shift(left, -tree_size, old.root)?;
        }
        debug!(
            node = old.id.0,
            start,
            diff,
            tree_size,
            parent = moved.parent.map(|p| p.0),
            root = moved.root.map(|r| r.0),
            "tree.move.done"
        );
        Ok(())
    }
}

fn pick_sibling(
    node: &Node,
    ordered: &[Node],
    steps: usize,
    direction: SiblingDirection,
) -> Result<NodeId> {
    if ordered.is_empty() {
        return Err(ValidationError::NoSibling {
            id: node.id,
            direction,
        }
        .into());
    }
    let index = steps.clamp(1, ordered.len()) - 1;
    Ok(ordered[index].id)
}
