#![forbid(unsafe_code)]

//! Offline maintenance of nested-set tables stored in SQLite files.
//!
//! This module backs the `canopy` command line tool: opening a database file,
//! verifying the interval encoding, reporting per-root statistics and running
//! repairs.

mod error;
mod options;
mod repair;
mod stats;
mod util;
mod verify;

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Configuration options for opening a database in admin mode.
pub use options::AdminOpenOptions;

/// Repair of a database file.
pub use repair::{repair, RepairRun};

/// Statistics collection and reporting.
///
/// Provides table-wide counters, per-root depth and bound statistics, and the
/// on-disk size of the database and its write-ahead log.
pub use stats::{
    stats, tree_stats, FilesystemStats, RootStatsSection, StatsReport, TableStatsSection,
};

/// Encoding verification.
///
/// Checks bounds, nesting, sizes, cached levels and parent pointers and reports
/// any issues found.
pub use verify::{
    verify, verify_tree, VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity,
};

/// Utility functions for opening a database.
pub use util::{open_store, open_tree};
