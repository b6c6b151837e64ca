#![forbid(unsafe_code)]

//! Field-name mapping binding the engine to a host table.
//!
//! A [`TreeConfig`] is established once, validated, and then shared read-only by
//! the store and the engine for the lifetime of both.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column mapping and table identity for one nested-set table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Host table name.
    pub table: String,
    /// Primary key column.
    pub primary_key: String,
    /// Parent pointer column.
    pub parent: String,
    /// Left bound column.
    pub left: String,
    /// Right bound column.
    pub right: String,
    /// Root partition column; `None` stores a single tree per table.
    #[serde(with = "optional_column")]
    pub root: Option<String>,
    /// Cached depth column; `None` disables level maintenance.
    #[serde(with = "optional_column")]
    pub level: Option<String>,
    /// Association depth hint forwarded with every read.
    pub read_depth: i32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: "nodes".into(),
            primary_key: "id".into(),
            parent: "parent_id".into(),
            left: "lft".into(),
            right: "rght".into(),
            root: Some("root_id".into()),
            level: Some("level".into()),
            read_depth: -1,
        }
    }
}

impl TreeConfig {
    /// Reads and validates a TOML mapping.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TreeConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the mapping as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    /// Uses `table` as host table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Disables root partitioning.
    pub fn without_root(mut self) -> Self {
        self.root = None;
        self
    }

    /// Disables cached levels.
    pub fn without_level(mut self) -> Self {
        self.level = None;
        self
    }

    /// Whether the table stores several independent trees.
    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    /// Whether depth is cached per row.
    pub fn has_level(&self) -> bool {
        self.level.is_some()
    }

    /// Checks every identifier before it reaches rendered SQL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("table", &self.table)?;
        let mut seen = HashSet::new();
        let columns = [
            ("primary_key", Some(&self.primary_key)),
            ("parent", Some(&self.parent)),
            ("left", Some(&self.left)),
            ("right", Some(&self.right)),
            ("root", self.root.as_ref()),
            ("level", self.level.as_ref()),
        ];
        for (key, column) in columns {
            let Some(column) = column else { continue };
            check_identifier(key, column)?;
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateColumn {
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Optional columns are written as `""` when disabled, so a file can switch
/// off a column the defaults enable.
mod optional_column {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        let raw = String::deserialize(de)?;
        Ok(if raw.is_empty() { None } else { Some(raw) })
    }
}

fn check_identifier(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            key,
            value: value.to_string(),
        })
    }
}

/// Location searched for a mapping when none is given explicitly.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("canopy").join("tree.toml"))
}

/// Errors raised while loading or validating a [`TreeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The mapping file could not be read.
    #[error("failed to read tree config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The mapping file is not valid TOML for this schema.
    #[error("failed to parse tree config {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// The mapping could not be rendered.
    #[error("failed to serialize tree config: {source}")]
    Serialize {
        /// Underlying error.
        source: toml::ser::Error,
    },
    /// A table or column name is not a plain identifier.
    #[error("config key '{key}' has invalid identifier '{value}'")]
    InvalidIdentifier {
        /// Offending key.
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// A structural field was used that this mapping does not configure.
    #[error("field '{field}' is not mapped to a column")]
    Unmapped {
        /// Field name.
        field: &'static str,
    },
    /// Two structural fields map to the same column.
    #[error("column '{column}' is mapped more than once")]
    DuplicateColumn {
        /// Repeated column.
        column: String,
    },
}
