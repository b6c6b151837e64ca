#![allow(missing_docs)]

use std::collections::HashMap;

use canopy::{
    admin::{verify_tree, VerifyLevel},
    Destination, NestedSet, NodeId, Position, SqliteStore, TreeConfig, TreeError,
    ValidationError,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    Add { parent: Option<usize> },
    Move { node: usize, dest: Option<usize>, position: Position },
    Remove { node: usize, delete_children: bool },
}

fn arb_position() -> impl Strategy<Value = Position> {
    prop_oneof![
        Just(Position::FirstChild),
        Just(Position::LastChild),
        Just(Position::PrevSibling),
        Just(Position::NextSibling),
    ]
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => proptest::option::of(0usize..64).prop_map(|parent| Operation::Add { parent }),
        4 => (0usize..64, proptest::option::weighted(0.85, 0usize..64), arb_position())
            .prop_map(|(node, dest, position)| Operation::Move { node, dest, position }),
        1 => (0usize..64, any::<bool>())
            .prop_map(|(node, delete_children)| Operation::Remove { node, delete_children }),
    ]
}

/// Parent-pointer model the engine is checked against.
#[derive(Default)]
struct Model {
    parents: HashMap<NodeId, Option<NodeId>>,
    order: Vec<NodeId>,
}

impl Model {
    fn pick(&self, index: usize) -> Option<NodeId> {
        if self.order.is_empty() {
            None
        } else {
            Some(self.order[index % self.order.len()])
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parents.get(&node).copied().flatten();
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parents.get(&id).copied().flatten();
        }
        false
    }

    fn descendants(&self, node: NodeId) -> usize {
        self.order
            .iter()
            .filter(|&&other| self.is_ancestor(node, other))
            .count()
    }

    fn remove(&mut self, node: NodeId, delete_children: bool) {
        let parent = self.parents.get(&node).copied().flatten();
        if delete_children {
            let doomed: Vec<NodeId> = self
                .order
                .iter()
                .copied()
                .filter(|&other| other == node || self.is_ancestor(node, other))
                .collect();
            for id in &doomed {
                self.parents.remove(id);
            }
            self.order.retain(|id| !doomed.contains(id));
        } else {
            for value in self.parents.values_mut() {
                if *value == Some(node) {
                    *value = parent;
                }
            }
            self.parents.remove(&node);
            self.order.retain(|&id| id != node);
        }
    }
}

fn open(config: TreeConfig) -> NestedSet<SqliteStore> {
    let store = SqliteStore::open_in_memory(config).expect("open");
    store.ensure_schema().expect("schema");
    NestedSet::new(store)
}

fn apply(tree: &NestedSet<SqliteStore>, model: &mut Model, op: &Operation) {
    match *op {
        Operation::Add { parent } => {
            let parent = parent.and_then(|index| model.pick(index));
            let id = tree.store().insert_placeholder().expect("insert");
            tree.move_node(id, Destination::from_parent(parent))
                .expect("add");
            model.parents.insert(id, parent);
            model.order.push(id);
        }
        Operation::Move {
            node,
            dest,
            position,
        } => {
            let Some(node) = model.pick(node) else {
                return;
            };
            let Some(dest) = dest.and_then(|index| model.pick(index)) else {
                tree.move_node(node, Destination::Top).expect("move to top");
                model.parents.insert(node, None);
                return;
            };
            let result = tree.move_node(node, Destination::at(dest, position));
            if dest == node || model.is_ancestor(node, dest) {
                assert!(matches!(
                    result,
                    Err(TreeError::Validation(
                        ValidationError::DestinationInsideSource { .. }
                    ))
                ));
                return;
            }
            result.expect("move");
            let parent = match position {
                Position::FirstChild | Position::LastChild => Some(dest),
                Position::PrevSibling | Position::NextSibling => {
                    model.parents.get(&dest).copied().flatten()
                }
            };
            model.parents.insert(node, parent);
        }
        Operation::Remove {
            node,
            delete_children,
        } => {
            let Some(node) = model.pick(node) else {
                return;
            };
            tree.remove_from_tree(node, delete_children)
                .expect("remove");
            model.remove(node, delete_children);
        }
    }
}

fn check(tree: &NestedSet<SqliteStore>, model: &Model) -> Result<(), TestCaseError> {
    let report = verify_tree(tree, VerifyLevel::Full).expect("verify");
    prop_assert!(report.findings.is_empty(), "findings: {:?}", report.findings);
    prop_assert_eq!(report.counts.nodes as usize, model.order.len());

    let nodes: HashMap<NodeId, _> = model
        .order
        .iter()
        .map(|&id| (id, tree.node(id).expect("node")))
        .collect();
    for &id in &model.order {
        let node = &nodes[&id];
        prop_assert_eq!(node.parent, model.parents[&id]);
        prop_assert_eq!(
            tree.child_count(id, false).expect("count") as usize,
            model.descendants(id)
        );
        for &other in &model.order {
            prop_assert_eq!(
                node.contains(&nodes[&other]),
                model.is_ancestor(id, other),
                "containment of {} in {}",
                other,
                id
            );
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_moves_and_removes_preserve_encoding(
        ops in prop::collection::vec(arb_operation(), 1..40)
    ) {
        let tree = open(TreeConfig::default());
        let mut model = Model::default();
        for op in &ops {
            apply(&tree, &mut model, op);
            check(&tree, &model)?;
        }
    }

    #[test]
    fn prop_unrooted_tables_preserve_encoding(
        ops in prop::collection::vec(arb_operation(), 1..30)
    ) {
        let tree = open(TreeConfig::default().without_root());
        let mut model = Model::default();
        for op in &ops {
            apply(&tree, &mut model, op);
            check(&tree, &model)?;
        }
    }

    #[test]
    fn prop_repair_round_trips_parents(
        ops in prop::collection::vec(arb_operation(), 1..30),
        offset in 1i64..50,
    ) {
        let tree = open(TreeConfig::default());
        let mut model = Model::default();
        for op in &ops {
            apply(&tree, &mut model, op);
        }
        tree.store()
            .connection()
            .execute("UPDATE nodes SET lft = lft * ?1, rght = rght + ?1, level = NULL", [offset])
            .expect("corrupt");

        tree.repair(canopy::RepairMode::Tree).expect("tree repair");
        tree.repair(canopy::RepairMode::Parent).expect("parent repair");
        check(&tree, &model)?;
    }
}
