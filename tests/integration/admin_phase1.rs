#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use canopy::{
    admin::{
        open_store, open_tree, repair, stats, verify, AdminError, AdminOpenOptions, VerifyLevel,
        VerifySeverity,
    },
    Destination, NodeId, RepairMode, RootId, TreeConfig,
};
use tempfile::TempDir;

fn setup_db(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.db"));
    seed_demo(&path).expect("seed demo data");
    (dir, path)
}

/// Root 1: 1 ⊃ {2 ⊃ 3, 4}. Root 2: 5.
fn seed_demo(path: &Path) -> canopy::admin::Result<Vec<NodeId>> {
    let opts = AdminOpenOptions {
        create_if_missing: true,
        ..admin_opts()
    };
    let tree = canopy::NestedSet::new(open_store(path, &opts)?);
    let mut ids = Vec::new();
    for parent in [None, Some(0), Some(1), Some(0), None] {
        let id = tree.store().insert_placeholder()?;
        let parent = parent.map(|index: usize| ids[index]);
        tree.move_node(id, Destination::from_parent(parent))?;
        ids.push(id);
    }
    Ok(ids)
}

fn admin_opts() -> AdminOpenOptions {
    AdminOpenOptions::default()
}

#[test]
fn stats_reports_sections() {
    let (_dir, db_path) = setup_db("admin-stats");
    let report = stats(&db_path, &admin_opts()).expect("stats report");

    assert_eq!(report.table.name, "nodes");
    assert_eq!(report.table.nodes, 5);
    assert_eq!(report.table.placed, 5);
    assert_eq!(report.table.placeholders, 0);
    assert!(report.table.rooted);
    assert!(report.table.cached_levels);

    assert_eq!(report.roots.len(), 2);
    assert_eq!(report.roots[0].root, Some(RootId(1)));
    assert_eq!(report.roots[0].nodes, 4);
    assert_eq!(report.roots[0].max_depth, 2);
    assert_eq!(report.roots[0].max_right, 8);
    assert_eq!(report.roots[1].nodes, 1);
    assert_eq!(report.roots[1].max_right, 2);
    assert!(report.filesystem.db_size_bytes > 0);
    assert!(report.filesystem.wal_path.ends_with("-wal"));
}

#[test]
fn verify_reports_success_on_fresh_db() {
    let (_dir, db_path) = setup_db("admin-verify");
    for level in [VerifyLevel::Fast, VerifyLevel::Full] {
        let report = verify(&db_path, &admin_opts(), level).expect("verify");
        assert!(report.success, "findings: {:?}", report.findings);
        assert!(report.findings.is_empty());
        assert_eq!(report.counts.nodes, 5);
        assert_eq!(report.counts.roots, 2);
    }
}

#[test]
fn verify_flags_corrupted_bounds() {
    let (_dir, db_path) = setup_db("admin-verify-corrupt");
    let store = open_store(&db_path, &admin_opts()).expect("open");
    store
        .connection()
        .execute("UPDATE nodes SET rght = 3 WHERE id = 2", [])
        .expect("corrupt");
    drop(store);

    let report = verify(&db_path, &admin_opts(), VerifyLevel::Full).expect("verify");
    assert!(!report.success);
    assert!(report
        .findings
        .iter()
        .any(|finding| finding.severity == VerifySeverity::Error));
}

#[test]
fn repair_rebuilds_and_reports() {
    let (_dir, db_path) = setup_db("admin-repair");
    let store = open_store(&db_path, &admin_opts()).expect("open");
    store
        .connection()
        .execute("UPDATE nodes SET lft = NULL, rght = NULL", [])
        .expect("wipe");
    drop(store);

    let run = repair(&db_path, &admin_opts(), RepairMode::Tree).expect("repair");
    assert_eq!(run.mode, RepairMode::Tree);
    assert_eq!(run.report.placed, 5);
    assert!(run.report.orphans.is_empty());
    assert!(run.duration_ms >= 0.0);

    let report = verify(&db_path, &admin_opts(), VerifyLevel::Full).expect("verify");
    assert!(report.success, "findings: {:?}", report.findings);

    let run = repair(&db_path, &admin_opts(), RepairMode::Parent).expect("parent repair");
    assert_eq!(run.report.parents_rewritten, 0);
    assert_eq!(run.report.skipped, 0);
}

#[test]
fn missing_database_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("absent.db");
    let err = stats(&path, &admin_opts()).expect_err("missing db");
    assert!(matches!(err, AdminError::MissingDatabase(p) if p == path));
    assert!(!path.exists());
}

#[test]
fn create_if_missing_builds_nested_directories() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("a").join("b").join("tree.db");
    let opts = AdminOpenOptions {
        create_if_missing: true,
        config: TreeConfig::default().with_table("categories").without_root(),
        ..admin_opts()
    };
    let tree = open_tree(&path, &opts).expect("open");
    let id = tree.store().insert_placeholder().expect("insert");
    tree.move_node(id, Destination::Top).expect("place");
    drop(tree);

    let opts = AdminOpenOptions {
        create_if_missing: false,
        ..opts
    };
    let report = stats(&path, &opts).expect("stats");
    assert_eq!(report.table.name, "categories");
    assert!(!report.table.rooted);
    assert_eq!(report.roots.len(), 1);
    assert_eq!(report.roots[0].root, None);
}
