use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::store::{Filter, TreeStore};
use crate::tree::{ListScope, NestedSet};
use crate::types::RootId;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::{open_tree, wal_path};
use crate::admin::Result;

/// Statistics about one nested-set table and the file holding it.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Table-wide counters.
    pub table: TableStatsSection,
    /// One entry per root partition, in root order.
    pub roots: Vec<RootStatsSection>,
    /// On-disk sizes.
    pub filesystem: FilesystemStats,
}

/// Table-wide counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStatsSection {
    /// Table name from the mapping.
    pub name: String,
    /// Rows in the table.
    pub nodes: u64,
    /// Rows with an interval.
    pub placed: u64,
    /// Rows not yet positioned in any tree.
    pub placeholders: u64,
    /// Whether the mapping partitions the table by root.
    pub rooted: bool,
    /// Whether the mapping caches levels.
    pub cached_levels: bool,
}

/// Counters for one root partition.
#[derive(Debug, Clone, Serialize)]
pub struct RootStatsSection {
    /// Partition id; `None` for an unrooted table.
    pub root: Option<RootId>,
    /// Placed nodes in the partition.
    pub nodes: u64,
    /// Deepest indentation found.
    pub max_depth: usize,
    /// Largest right bound in use.
    pub max_right: i64,
}

/// On-disk sizes of the database and its write-ahead log.
#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStats {
    /// Database file.
    pub db_path: String,
    /// Size of the database file.
    pub db_size_bytes: u64,
    /// Write-ahead log next to the database file.
    pub wal_path: String,
    /// Size of the write-ahead log; 0 when absent.
    pub wal_size_bytes: u64,
}

/// Collects statistics for the database at `path`.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or read.
pub fn stats(path: impl AsRef<Path>, opts: &AdminOpenOptions) -> Result<StatsReport> {
    let path = path.as_ref();
    let tree = open_tree(path, opts)?;
    let (table, roots) = tree_stats(&tree)?;

    let db_meta = fs::metadata(path)?;
    let wal_path = wal_path(path);
    let wal_size = fs::metadata(&wal_path).map(|m| m.len()).unwrap_or(0);
    let filesystem = FilesystemStats {
        db_path: path.display().to_string(),
        db_size_bytes: db_meta.len(),
        wal_path: wal_path.display().to_string(),
        wal_size_bytes: wal_size,
    };

    Ok(StatsReport {
        table,
        roots,
        filesystem,
    })
}

/// Table and per-root counters for `tree`.
///
/// # Errors
///
/// Returns an error if the rows cannot be read.
pub fn tree_stats<S: TreeStore>(
    tree: &NestedSet<S>,
) -> Result<(TableStatsSection, Vec<RootStatsSection>)> {
    let config = tree.config();
    let nodes = tree.store().count(&Filter::all())?;
    let listing = tree.flatten(ListScope::All)?;

    let mut roots: BTreeMap<Option<RootId>, RootStatsSection> = BTreeMap::new();
    for entry in &listing {
        let section = roots
            .entry(entry.node.root)
            .or_insert_with(|| RootStatsSection {
                root: entry.node.root,
                nodes: 0,
                max_depth: 0,
                max_right: 0,
            });
        section.nodes += 1;
        section.max_depth = section.max_depth.max(entry.depth);
        section.max_right = section.max_right.max(entry.node.right.unwrap_or(0));
    }

    let placed = listing.len() as u64;
    let table = TableStatsSection {
        name: config.table.clone(),
        nodes,
        placed,
        placeholders: nodes.saturating_sub(placed),
        rooted: config.has_root(),
        cached_levels: config.has_level(),
    };
    Ok((table, roots.into_values().collect()))
}
