#![allow(missing_docs)]

use canopy::{
    admin::{verify_tree, VerifyLevel},
    Destination, ListScope, NestedSet, NodeId, Position, RootId, SqliteStore, TreeConfig,
};

fn open(config: TreeConfig) -> NestedSet<SqliteStore> {
    let store = SqliteStore::open_in_memory(config).expect("open");
    store.ensure_schema().expect("schema");
    NestedSet::new(store)
}

fn add(tree: &NestedSet<SqliteStore>, destination: Destination) -> NodeId {
    let id = tree.store().insert_placeholder().expect("insert");
    tree.move_node(id, destination).expect("place");
    id
}

fn assert_valid(tree: &NestedSet<SqliteStore>) {
    let report = verify_tree(tree, VerifyLevel::Full).expect("verify");
    assert!(report.findings.is_empty(), "findings: {:?}", report.findings);
}

#[test]
fn subtree_migrates_between_roots() {
    let tree = open(TreeConfig::default());
    let a = add(&tree, Destination::Top);
    let b = add(&tree, Destination::child_of(a));
    let x = add(&tree, Destination::Top);
    assert_eq!(tree.node(x).expect("x").root, Some(RootId(2)));

    tree.move_node(a, Destination::child_of(x)).expect("migrate");

    let x_node = tree.node(x).expect("x");
    let a_node = tree.node(a).expect("a");
    let b_node = tree.node(b).expect("b");
    assert_eq!(x_node.bounds(), Some((1, 6)));
    assert_eq!(a_node.bounds(), Some((2, 5)));
    assert_eq!(b_node.bounds(), Some((3, 4)));
    assert_eq!(a_node.root, Some(RootId(2)));
    assert_eq!(b_node.root, Some(RootId(2)));
    assert_eq!(a_node.level, Some(1));
    assert_eq!(b_node.level, Some(2));
    assert_eq!(a_node.parent, Some(x));
    assert_valid(&tree);
}

#[test]
fn leaf_moves_into_named_root() {
    let tree = open(TreeConfig::default());
    let x = add(&tree, Destination::Top);
    let a = add(&tree, Destination::child_of(x));
    let b = add(&tree, Destination::child_of(a));

    tree.move_node(b, Destination::Root(RootId(7)))
        .expect("to root");
    let b_node = tree.node(b).expect("b");
    assert_eq!(b_node.root, Some(RootId(7)));
    assert_eq!(b_node.bounds(), Some((1, 2)));
    assert_eq!(b_node.parent, None);
    assert_eq!(b_node.level, Some(0));
    assert_eq!(tree.node(x).expect("x").bounds(), Some((1, 4)));
    assert_eq!(tree.node(a).expect("a").bounds(), Some((2, 3)));

    let c = add(&tree, Destination::Root(RootId(7)));
    assert_eq!(tree.node(c).expect("c").bounds(), Some((3, 4)));
    assert_eq!(tree.siblings(b, false).expect("siblings").len(), 1);
    assert_valid(&tree);
}

#[test]
fn own_root_detaches_within_partition() {
    let tree = open(TreeConfig::default());
    let x = add(&tree, Destination::Top);
    let a = add(&tree, Destination::child_of(x));

    tree.move_node(a, Destination::OwnRoot).expect("detach");
    let a_node = tree.node(a).expect("a");
    assert_eq!(a_node.root, Some(RootId(1)));
    assert_eq!(a_node.bounds(), Some((3, 4)));
    assert_eq!(a_node.parent, None);
    assert_eq!(tree.node(x).expect("x").bounds(), Some((1, 2)));
    assert_valid(&tree);
}

#[test]
fn own_root_without_root_allocates_one() {
    let tree = open(TreeConfig::default());
    add(&tree, Destination::Top);
    let loose = tree.store().insert_placeholder().expect("insert");
    tree.move_node(loose, Destination::OwnRoot).expect("place");
    assert_eq!(tree.node(loose).expect("node").root, Some(RootId(2)));
}

#[test]
fn shifts_do_not_leak_across_roots() {
    let tree = open(TreeConfig::default());
    let a = add(&tree, Destination::Top);
    let x = add(&tree, Destination::Top);
    let y = add(&tree, Destination::child_of(x));

    for _ in 0..3 {
        add(&tree, Destination::at(y, Position::PrevSibling));
    }
    assert_eq!(tree.node(a).expect("a").bounds(), Some((1, 2)));
    assert_eq!(tree.node(x).expect("x").bounds(), Some((1, 10)));
    assert_eq!(tree.child_count(x, true).expect("count"), 4);
    assert_valid(&tree);
}

#[test]
fn unrooted_table_is_one_sequence() {
    let tree = open(TreeConfig::default().without_root().without_level());
    let a = add(&tree, Destination::Top);
    let b = add(&tree, Destination::child_of(a));
    let c = add(&tree, Destination::Top);
    let d = add(&tree, Destination::child_of(c));

    assert_eq!(tree.node(c).expect("c").bounds(), Some((5, 8)));
    tree.move_node(d, Destination::at(b, Position::NextSibling))
        .expect("move");
    assert_eq!(tree.node(a).expect("a").bounds(), Some((1, 6)));
    assert_eq!(tree.node(d).expect("d").bounds(), Some((4, 5)));
    assert_eq!(tree.node(c).expect("c").bounds(), Some((7, 8)));
    assert_eq!(tree.node(d).expect("d").level, None);

    let listing: Vec<(NodeId, usize)> = tree
        .flatten(ListScope::All)
        .expect("flatten")
        .into_iter()
        .map(|entry| (entry.node.id, entry.depth))
        .collect();
    assert_eq!(listing, vec![(a, 0), (b, 1), (d, 1), (c, 0)]);
    assert_valid(&tree);
}
