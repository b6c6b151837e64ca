#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use canopy::{
    admin::{open_store, AdminOpenOptions},
    store::Filter,
    TreeConfig, TreeStore,
};
use serde_json::Value;
use tempfile::TempDir;

fn setup_db(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.db"));
    cargo_bin_cmd!("canopy")
        .arg("init")
        .arg(&path)
        .assert()
        .success();
    (dir, path)
}

fn run_json(args: &[&str], db: &Path) -> Value {
    let output = cargo_bin_cmd!("canopy")
        .args(["--format", "json"])
        .arg(args[0])
        .arg(db)
        .args(&args[1..])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

fn add(db: &Path, extra: &[&str]) -> i64 {
    let mut args = vec!["add"];
    args.extend_from_slice(extra);
    run_json(&args, db)["id"].as_i64().expect("node id")
}

fn listing(db: &Path) -> Vec<(i64, u64)> {
    run_json(&["list"], db)
        .as_array()
        .expect("list array")
        .iter()
        .map(|entry| {
            (
                entry["node"]["id"].as_i64().expect("id"),
                entry["depth"].as_u64().expect("depth"),
            )
        })
        .collect()
}

#[test]
fn add_move_and_list_round_trip() {
    let (_dir, db) = setup_db("cli-add");
    let a = add(&db, &[]);
    let b = add(&db, &["--to", &a.to_string()]);
    let c = add(&db, &["--to", &a.to_string()]);
    assert_eq!(listing(&db), vec![(a, 0), (b, 1), (c, 1)]);

    let moved = run_json(
        &[
            "move",
            &c.to_string(),
            "--to",
            &b.to_string(),
            "--position",
            "first-child",
        ],
        &db,
    );
    assert_eq!(moved["parent"].as_i64(), Some(b));
    assert_eq!(moved["left"].as_i64(), Some(3));
    assert_eq!(moved["right"].as_i64(), Some(4));
    assert_eq!(moved["level"].as_i64(), Some(2));
    assert_eq!(listing(&db), vec![(a, 0), (b, 1), (c, 2)]);

    let under = run_json(&["list", "--under", &b.to_string()], &db);
    assert_eq!(under.as_array().map(Vec::len), Some(1));
}

#[test]
fn up_and_down_reorder_siblings() {
    let (_dir, db) = setup_db("cli-up-down");
    let a = add(&db, &[]);
    let b = add(&db, &["--to", &a.to_string()]);
    let c = add(&db, &["--to", &a.to_string()]);

    let up = run_json(&["up", &c.to_string()], &db);
    assert_eq!(up["left"].as_i64(), Some(2));
    assert_eq!(listing(&db), vec![(a, 0), (c, 1), (b, 1)]);

    run_json(&["down", &c.to_string()], &db);
    assert_eq!(listing(&db), vec![(a, 0), (b, 1), (c, 1)]);
}

#[test]
fn verify_stats_and_repair_emit_json() {
    let (_dir, db) = setup_db("cli-admin");
    let a = add(&db, &[]);
    add(&db, &["--to", &a.to_string()]);
    add(&db, &["--root", "5"]);

    let verify = run_json(&["verify"], &db);
    assert_eq!(verify["success"], Value::Bool(true));
    assert_eq!(verify["level"], "full");
    assert_eq!(verify["counts"]["nodes"].as_u64(), Some(3));

    let stats = run_json(&["stats"], &db);
    assert_eq!(stats["table"]["name"], "nodes");
    let roots = stats["roots"].as_array().expect("roots");
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[1]["root"].as_i64(), Some(5));

    let repair = run_json(&["repair", "--mode", "tree"], &db);
    assert_eq!(repair["mode"], "tree");
    assert_eq!(repair["report"]["placed"].as_u64(), Some(3));
}

#[test]
fn verify_exits_nonzero_on_broken_encoding() {
    let (_dir, db) = setup_db("cli-broken");
    let a = add(&db, &[]);
    add(&db, &["--to", &a.to_string()]);
    collapse_bounds(&db);

    cargo_bin_cmd!("canopy")
        .args(["--format", "json", "verify"])
        .arg(&db)
        .assert()
        .code(2);

    cargo_bin_cmd!("canopy")
        .args(["repair", "--mode", "tree"])
        .arg(&db)
        .assert()
        .success();
    let verify = run_json(&["verify"], &db);
    assert_eq!(verify["success"], Value::Bool(true));
}

#[test]
fn rejected_add_leaves_no_row() {
    let (_dir, db) = setup_db("cli-add-missing");
    cargo_bin_cmd!("canopy")
        .arg("add")
        .arg(&db)
        .args(["--to", "999"])
        .assert()
        .failure();

    let store = open_store(&db, &AdminOpenOptions::default()).expect("open");
    assert_eq!(store.count(&Filter::all()).expect("count"), 0);
    assert_eq!(store.transaction_depth(), 0);

    let a = add(&db, &[]);
    assert_eq!(listing(&db), vec![(a, 0)]);
}

#[test]
fn text_output_draws_tree_guides() {
    let (_dir, db) = setup_db("cli-text");
    let a = add(&db, &[]);
    let b = add(&db, &["--to", &a.to_string()]);
    add(&db, &["--to", &b.to_string()]);
    add(&db, &["--to", &a.to_string()]);

    let output = cargo_bin_cmd!("canopy")
        .args(["--color", "never", "list"])
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4, "{text}");
    assert!(lines[0].starts_with("1 "), "{text}");
    assert!(lines[1].starts_with("├─ 2 "), "{text}");
    assert!(lines[2].starts_with("│  └─ 3 "), "{text}");
    assert!(lines[3].starts_with("└─ 4 "), "{text}");

    let stats = cargo_bin_cmd!("canopy")
        .args(["--color", "never", "stats"])
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats = String::from_utf8(stats).expect("utf8");
    assert!(stats.contains("Roots"), "{stats}");
    assert!(stats.contains("max_depth"), "{stats}");
}

fn collapse_bounds(db: &Path) {
    let store = open_store(db, &AdminOpenOptions::default()).expect("open");
    store
        .connection()
        .execute("UPDATE nodes SET rght = lft", [])
        .expect("corrupt");
}

#[test]
fn remove_promotes_children_by_default() {
    let (_dir, db) = setup_db("cli-remove");
    let a = add(&db, &[]);
    let b = add(&db, &["--to", &a.to_string()]);
    let c = add(&db, &["--to", &b.to_string()]);

    let removed = run_json(&["remove", &b.to_string()], &db);
    assert_eq!(removed["removed"].as_i64(), Some(b));
    assert_eq!(removed["with_children"], Value::Bool(false));
    assert_eq!(listing(&db), vec![(a, 0), (c, 1)]);

    run_json(&["remove", &a.to_string(), "--with-children"], &db);
    assert!(listing(&db).is_empty());
}

#[test]
fn config_file_selects_table() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("tree.toml");
    let toml = TreeConfig::default()
        .with_table("categories")
        .to_toml()
        .expect("render config");
    fs::write(&config_path, toml).expect("write config");
    let db = dir.path().join("categories.db");

    let output = cargo_bin_cmd!("canopy")
        .arg("--config")
        .arg(&config_path)
        .args(["--format", "json", "init"])
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let init: Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(init["table"], "categories");

    cargo_bin_cmd!("canopy")
        .arg("--config")
        .arg(&config_path)
        .arg("add")
        .arg(&db)
        .assert()
        .success();
}

#[test]
fn missing_database_fails() {
    let dir = TempDir::new().expect("tempdir");
    cargo_bin_cmd!("canopy")
        .arg("stats")
        .arg(dir.path().join("absent.db"))
        .assert()
        .failure()
        .code(1);
}
