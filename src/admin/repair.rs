use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::open_tree;
use crate::admin::Result;
use crate::tree::{RepairMode, RepairReport};

/// Report generated after executing a repair.
#[derive(Debug, Clone, Serialize)]
pub struct RepairRun {
    /// The repair mode used ("tree" or "parent").
    pub mode: RepairMode,
    /// Duration of the repair in milliseconds.
    pub duration_ms: f64,
    /// What the engine changed.
    pub report: RepairReport,
}

/// Executes a repair on a database file.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the repair fails; a
/// failed repair leaves the table untouched.
pub fn repair(path: impl AsRef<Path>, opts: &AdminOpenOptions, mode: RepairMode) -> Result<RepairRun> {
    let tree = open_tree(path.as_ref(), opts)?;
    let start = Instant::now();
    let report = tree.repair(mode)?;
    let elapsed = start.elapsed();
    Ok(RepairRun {
        mode,
        duration_ms: elapsed.as_secs_f64() * 1_000.0,
        report,
    })
}
