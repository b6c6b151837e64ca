use crate::config::TreeConfig;

/// Common options used when opening a database for administrative commands.
#[derive(Clone, Debug)]
pub struct AdminOpenOptions {
    /// Field mapping of the nested-set table.
    pub config: TreeConfig,
    /// Whether to create the database file and table if they don't exist.
    pub create_if_missing: bool,
    /// How long a writer waits on another connection's lock, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for AdminOpenOptions {
    fn default() -> Self {
        Self {
            config: TreeConfig::default(),
            create_if_missing: false,
            busy_timeout_ms: 5_000,
        }
    }
}
