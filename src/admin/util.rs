use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::store::SqliteStore;
use crate::tree::NestedSet;

use crate::admin::error::{AdminError, Result};
use crate::admin::options::AdminOpenOptions;

/// Opens or creates the SQLite database at the specified path.
///
/// With `create_if_missing` the table and its indexes are created when absent.
///
/// # Errors
///
/// Returns an error if the database doesn't exist and `create_if_missing` is false,
/// or if opening the connection fails.
pub fn open_store(path: &Path, opts: &AdminOpenOptions) -> Result<SqliteStore> {
    let store = if path.exists() {
        SqliteStore::open_existing(path, opts.config.clone())?
    } else if opts.create_if_missing {
        ensure_parent_dir(path)?;
        SqliteStore::open(path, opts.config.clone())?
    } else {
        return Err(AdminError::missing_database(path));
    };
    store.set_busy_timeout(Duration::from_millis(opts.busy_timeout_ms))?;
    if opts.create_if_missing {
        store.ensure_schema()?;
    }
    debug!(path = %path.display(), table = %opts.config.table, "admin.open");
    Ok(store)
}

/// Opens the database and binds the tree engine to it.
///
/// # Errors
///
/// Returns an error if opening the store fails.
pub fn open_tree(path: &Path, opts: &AdminOpenOptions) -> Result<NestedSet<SqliteStore>> {
    Ok(NestedSet::new(open_store(path, opts)?))
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub(crate) fn wal_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("canopy.db"));
    name.push("-wal");
    let mut output = path.to_path_buf();
    output.set_file_name(name);
    output
}
