use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::store::{Field, Filter, Order, Query, TreeStore};
use crate::tree::NestedSet;
use crate::types::{Node, NodeId, RootId, TreeError};

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::open_tree;
use crate::admin::Result;

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Per-row checks: ordered bounds and unique bound values.
    Fast,
    /// Adds nesting, size, level and parent-pointer agreement checks.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Legal but unusual state, such as gaps in the numbering.
    Warning,
    /// Broken encoding.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Node the finding is about, if any.
    pub node: Option<NodeId>,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected during the verification process.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Rows in the table.
    pub nodes: u64,
    /// Rows with an interval.
    pub placed: u64,
    /// Rows not yet positioned in any tree.
    pub placeholders: u64,
    /// Distinct root partitions among placed rows.
    pub roots: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether no error-severity finding was recorded.
    pub success: bool,
    /// List of issues discovered during verification.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the rows examined.
    pub counts: VerifyCounts,
}

/// Verifies the nested-set encoding stored in a database file.
///
/// `VerifyLevel::Fast` runs SQLite's `quick_check` and the per-row checks;
/// `VerifyLevel::Full` adds every structural check of [`verify_tree`].
///
/// # Errors
///
/// Returns an error if the database cannot be opened or read.
pub fn verify(
    path: impl AsRef<Path>,
    opts: &AdminOpenOptions,
    level: VerifyLevel,
) -> Result<VerifyReport> {
    let tree = open_tree(path.as_ref(), opts)?;
    let quick: String = tree
        .store()
        .connection()
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(TreeError::from)?;
    let mut report = verify_tree(&tree, level)?;
    if quick != "ok" {
        push(
            &mut report.findings,
            VerifySeverity::Error,
            None,
            format!("sqlite quick_check: {quick}"),
        );
        report.success = false;
    }
    Ok(report)
}

/// Checks the encoding held by `tree`'s store.
///
/// # Errors
///
/// Returns an error if the rows cannot be read.
pub fn verify_tree<S: TreeStore>(tree: &NestedSet<S>, level: VerifyLevel) -> Result<VerifyReport> {
    let config = tree.config();
    let mut query = Query::new(Filter::all()).depth(config.read_depth);
    if config.has_root() {
        query = query.order_by(Field::Root, Order::Asc);
    }
    let rows = tree
        .store()
        .find(&query.order_by(Field::Left, Order::Asc).order_by(Field::Id, Order::Asc))?;
    let report = check_rows(&rows, config.has_level(), level);
    if !report.success {
        warn!(
            findings = report.findings.len(),
            level = ?level,
            "admin.verify.failed"
        );
    }
    Ok(report)
}

fn check_rows(rows: &[Node], cached_level: bool, level: VerifyLevel) -> VerifyReport {
    let mut findings = Vec::new();
    let mut counts = VerifyCounts {
        nodes: rows.len() as u64,
        ..VerifyCounts::default()
    };
    let ids: HashSet<NodeId> = rows.iter().map(|n| n.id).collect();

    let mut partitions: BTreeMap<Option<RootId>, Vec<&Node>> = BTreeMap::new();
    for node in rows {
        if node.is_placed() {
            partitions.entry(node.root).or_default().push(node);
        } else {
            counts.placeholders += 1;
        }
    }
    counts.placed = counts.nodes - counts.placeholders;
    counts.roots = partitions.len() as u64;

    for (root, nodes) in &partitions {
        check_bounds(*root, nodes, &mut findings);
        if matches!(level, VerifyLevel::Full) {
            check_structure(nodes, &ids, cached_level, &mut findings);
        }
        if findings.len() >= MAX_FINDINGS {
            break;
        }
    }

    VerifyReport {
        level,
        success: !findings
            .iter()
            .any(|f: &VerifyFinding| f.severity == VerifySeverity::Error),
        findings,
        counts,
    }
}

fn check_bounds(root: Option<RootId>, nodes: &[&Node], findings: &mut Vec<VerifyFinding>) {
    let mut seen = HashSet::with_capacity(nodes.len() * 2);
    for node in nodes {
        let Some((left, right)) = node.bounds() else {
            continue;
        };
        if left >= right {
            push(
                findings,
                VerifySeverity::Error,
                Some(node.id),
                format!("left {left} is not below right {right}"),
            );
        }
        for bound in [left, right] {
            if !seen.insert(bound) {
                let root = root.map_or_else(|| "-".to_string(), |r| r.to_string());
                push(
                    findings,
                    VerifySeverity::Error,
                    Some(node.id),
                    format!("bound {bound} used twice in root {root}"),
                );
            }
        }
    }
}

/// `nodes` must be sorted by left bound.
fn check_structure(
    nodes: &[&Node],
    ids: &HashSet<NodeId>,
    cached_level: bool,
    findings: &mut Vec<VerifyFinding>,
) {
    let lefts: Vec<i64> = nodes.iter().filter_map(|n| n.left).collect();
    let mut open: Vec<(i64, NodeId)> = Vec::new();
    for node in nodes {
        let Some((left, right)) = node.bounds() else {
            continue;
        };
        // Inverted intervals are reported by `check_bounds` and nest nowhere.
        if left >= right {
            continue;
        }
        while open.last().is_some_and(|&(top, _)| top < left) {
            open.pop();
        }
        if let Some(&(top, ancestor)) = open.last() {
            if right > top {
                push(
                    findings,
                    VerifySeverity::Error,
                    Some(node.id),
                    format!("interval ({left}, {right}) partially overlaps node {ancestor}"),
                );
            }
        }

        let derived = open.last().map(|&(_, id)| id);
        if derived != node.parent {
            let stored = node
                .parent
                .map_or_else(|| "none".to_string(), |p| p.to_string());
            let expected = derived.map_or_else(|| "none".to_string(), |p| p.to_string());
            let dangling = node.parent.is_some_and(|p| !ids.contains(&p));
            push(
                findings,
                VerifySeverity::Error,
                Some(node.id),
                format!(
                    "parent pointer {stored}{} disagrees with enclosing interval {expected}",
                    if dangling { " (missing row)" } else { "" }
                ),
            );
        }

        if cached_level {
            let depth = open.len() as i64;
            if node.level != Some(depth) {
                push(
                    findings,
                    VerifySeverity::Error,
                    Some(node.id),
                    format!("cached level {:?} but {depth} ancestors", node.level),
                );
            }
        }

        let start = lefts.partition_point(|&l| l <= left);
        let end = lefts.partition_point(|&l| l < right);
        let descendants = (end - start) as i64;
        if right - left + 1 != 2 * (1 + descendants) {
            push(
                findings,
                VerifySeverity::Warning,
                Some(node.id),
                format!(
                    "interval width {} for {descendants} descendants",
                    right - left + 1
                ),
            );
        }

        open.push((right, node.id));
        if findings.len() >= MAX_FINDINGS {
            break;
        }
    }
}

fn push(
    findings: &mut Vec<VerifyFinding>,
    severity: VerifySeverity,
    node: Option<NodeId>,
    message: impl Into<String>,
) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding {
            severity,
            node,
            message: message.into(),
        });
    }
}
