//! [`TreeStore`] backed by a SQLite table.

use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use tracing::{debug, trace};

use super::{Assignment, Condition, Field, Filter, Order, Query, TreeStore};
use crate::config::{ConfigError, TreeConfig};
use crate::types::{Node, NodeId, Result, RootId, TreeError};

const SAVEPOINT_PREFIX: &str = "canopy_tx";

impl From<rusqlite::Error> for TreeError {
    fn from(err: rusqlite::Error) -> Self {
        TreeError::storage(err)
    }
}

/// Nested-set table living in a SQLite database.
///
/// The outermost transaction scope is `BEGIN IMMEDIATE`, which takes the
/// database write lock before the first read so that two writers cannot
/// interleave a bounds read with a shift. Inner scopes are savepoints.
pub struct SqliteStore {
    conn: Connection,
    config: TreeConfig,
    depth: Cell<u32>,
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>, config: TreeConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn, config)
    }

    /// Opens an existing database file without creating it.
    pub fn open_existing(path: impl AsRef<Path>, config: TreeConfig) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn, config)
    }

    /// Private in-memory database.
    pub fn open_in_memory(config: TreeConfig) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    /// Wraps an already opened connection.
    pub fn from_connection(conn: Connection, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            conn,
            config,
            depth: Cell::new(0),
        })
    }

    /// How long a writer waits for another connection's lock before failing.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Underlying connection, for host-owned columns and fixtures.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates the table and its lookup indexes when missing.
    ///
    /// Bounds carry no unique index: shifts pass through transient
    /// duplicates between their two range updates.
    pub fn ensure_schema(&self) -> Result<()> {
        let c = &self.config;
        let mut columns = vec![
            format!("{} INTEGER PRIMARY KEY", quote(&c.primary_key)),
            format!("{} INTEGER NULL", quote(&c.parent)),
            format!("{} INTEGER NULL", quote(&c.left)),
            format!("{} INTEGER NULL", quote(&c.right)),
        ];
        if let Some(root) = &c.root {
            columns.push(format!("{} INTEGER NULL", quote(root)));
        }
        if let Some(level) = &c.level {
            columns.push(format!("{} INTEGER NULL", quote(level)));
        }
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote(&c.table),
            columns.join(", ")
        );
        let bounds_key = match &c.root {
            Some(root) => format!("{}, {}", quote(root), quote(&c.left)),
            None => quote(&c.left),
        };
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
            quote(&format!("{}_bounds_idx", c.table)),
            quote(&c.table),
            bounds_key
        ));
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
            quote(&format!("{}_parent_idx", c.table)),
            quote(&c.table),
            quote(&c.parent)
        ));
        self.conn.execute_batch(&sql)?;
        debug!(table = %c.table, "store.sqlite.schema_ready");
        Ok(())
    }

    /// Inserts a row that is not yet part of any tree.
    pub fn insert_placeholder(&self) -> Result<NodeId> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (NULL)",
            quote(&self.config.table),
            quote(&self.config.parent)
        );
        self.conn.execute(&sql, [])?;
        Ok(NodeId(self.conn.last_insert_rowid()))
    }

    /// Current transaction nesting depth.
    pub fn transaction_depth(&self) -> u32 {
        self.depth.get()
    }

    fn column(&self, field: Field) -> Result<&str> {
        let c = &self.config;
        let column = match field {
            Field::Id => Some(&c.primary_key),
            Field::Parent => Some(&c.parent),
            Field::Left => Some(&c.left),
            Field::Right => Some(&c.right),
            Field::Root => c.root.as_ref(),
            Field::Level => c.level.as_ref(),
        };
        column.map(String::as_str).ok_or_else(|| {
            TreeError::Config(ConfigError::Unmapped {
                field: field_name(field),
            })
        })
    }

    fn render_filter(&self, filter: &Filter, params: &mut Vec<Option<i64>>) -> Result<String> {
        if filter.conditions().is_empty() {
            return Ok(String::new());
        }
        let mut terms = Vec::with_capacity(filter.conditions().len());
        for condition in filter.conditions() {
            match *condition {
                Condition::Compare(field, cmp, value) => {
                    terms.push(format!("{} {} ?", quote(self.column(field)?), cmp.as_sql()));
                    params.push(Some(value));
                }
                Condition::IsNull(field) => {
                    terms.push(format!("{} IS NULL", quote(self.column(field)?)));
                }
            }
        }
        Ok(format!(" WHERE {}", terms.join(" AND ")))
    }

    fn select_list(&self) -> String {
        let c = &self.config;
        let mut columns = vec![
            quote(&c.primary_key),
            quote(&c.parent),
            quote(&c.left),
            quote(&c.right),
        ];
        if let Some(root) = &c.root {
            columns.push(quote(root));
        }
        if let Some(level) = &c.level {
            columns.push(quote(level));
        }
        columns.join(", ")
    }

    fn read_node(&self, row: &Row<'_>) -> rusqlite::Result<Node> {
        let mut idx = 4;
        let root = if self.config.has_root() {
            let value: Option<i64> = row.get(idx)?;
            idx += 1;
            value.map(RootId)
        } else {
            None
        };
        let level = if self.config.has_level() {
            row.get(idx)?
        } else {
            None
        };
        Ok(Node {
            id: NodeId(row.get(0)?),
            parent: row.get::<_, Option<i64>>(1)?.map(NodeId),
            left: row.get(2)?,
            right: row.get(3)?,
            root,
            level,
        })
    }

    fn field_value(node: &Node, field: Field) -> Option<i64> {
        match field {
            Field::Id => Some(node.id.0),
            Field::Parent => node.parent.map(|p| p.0),
            Field::Left => node.left,
            Field::Right => node.right,
            Field::Root => node.root.map(|r| r.0),
            Field::Level => node.level,
        }
    }
}

impl TreeStore for SqliteStore {
    fn config(&self) -> &TreeConfig {
        &self.config
    }

    fn insert_placeholder(&self) -> Result<NodeId> {
        SqliteStore::insert_placeholder(self)
    }

    fn find(&self, query: &Query) -> Result<Vec<Node>> {
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.select_list(),
            quote(&self.config.table)
        );
        sql.push_str(&self.render_filter(&query.filter, &mut params)?);
        if !query.order.is_empty() {
            let mut keys = Vec::with_capacity(query.order.len());
            for (field, order) in &query.order {
                let dir = match order {
                    Order::Asc => "ASC",
                    Order::Desc => "DESC",
                };
                keys.push(format!("{} {dir}", quote(self.column(*field)?)));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        // Flat rows carry no associations, so the depth hint has nothing to bound.
        trace!(sql = %sql, depth = query.depth, "store.sqlite.find");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| self.read_node(row))?;
        let mut nodes = Vec::new();
        for node in rows {
            nodes.push(node?);
        }
        Ok(nodes)
    }

    fn count(&self, filter: &Filter) -> Result<u64> {
        let mut params = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote(&self.config.table),
            self.render_filter(filter, &mut params)?
        );
        trace!(sql = %sql, "store.sqlite.count");
        let count: i64 = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn update_all(&self, assignments: &[Assignment], filter: &Filter) -> Result<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let mut params = Vec::new();
        let mut sets = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            match *assignment {
                Assignment::Set(field, value) => {
                    sets.push(format!("{} = ?", quote(self.column(field)?)));
                    params.push(value);
                }
                Assignment::Offset(field, delta) => {
                    let column = quote(self.column(field)?);
                    sets.push(format!("{column} = {column} + ?"));
                    params.push(Some(delta));
                }
            }
        }
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote(&self.config.table),
            sets.join(", "),
            self.render_filter(filter, &mut params)?
        );
        let rows = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(params.iter()))?;
        trace!(sql = %sql, rows, "store.sqlite.update_all");
        Ok(rows)
    }

    fn delete_all(&self, filter: &Filter) -> Result<usize> {
        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {}{}",
            quote(&self.config.table),
            self.render_filter(filter, &mut params)?
        );
        let rows = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(params.iter()))?;
        trace!(sql = %sql, rows, "store.sqlite.delete_all");
        Ok(rows)
    }

    fn save(&self, node: &Node, fields: &[Field]) -> Result<()> {
        let mut params = Vec::with_capacity(fields.len() + 1);
        let mut sets = Vec::with_capacity(fields.len());
        for field in fields.iter().copied().filter(|f| *f != Field::Id) {
            sets.push(format!("{} = ?", quote(self.column(field)?)));
            params.push(Self::field_value(node, field));
        }
        if sets.is_empty() {
            return Ok(());
        }
        params.push(Some(node.id.0));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote(&self.config.table),
            sets.join(", "),
            quote(&self.config.primary_key)
        );
        let rows = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(params.iter()))?;
        trace!(sql = %sql, node = node.id.0, "store.sqlite.save");
        if rows == 0 {
            return Err(TreeError::NotFound(node.id));
        }
        Ok(())
    }

    fn max_of(&self, field: Field, filter: &Filter) -> Result<Option<i64>> {
        let mut params = Vec::new();
        let sql = format!(
            "SELECT MAX({}) FROM {}{}",
            quote(self.column(field)?),
            quote(&self.config.table),
            self.render_filter(filter, &mut params)?
        );
        trace!(sql = %sql, "store.sqlite.max_of");
        let max: Option<i64> = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(max)
    }

    fn begin(&self) -> Result<()> {
        let depth = self.depth.get();
        if depth == 0 {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        } else {
            self.conn
                .execute_batch(&format!("SAVEPOINT {SAVEPOINT_PREFIX}_{depth}"))?;
        }
        self.depth.set(depth + 1);
        trace!(depth = depth + 1, "store.sqlite.begin");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let depth = self
            .depth
            .get()
            .checked_sub(1)
            .ok_or_else(|| TreeError::corrupt("commit without an open transaction"))?;
        if depth == 0 {
            self.conn.execute_batch("COMMIT")?;
        } else {
            self.conn
                .execute_batch(&format!("RELEASE {SAVEPOINT_PREFIX}_{depth}"))?;
        }
        self.depth.set(depth);
        trace!(depth, "store.sqlite.commit");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let depth = self
            .depth
            .get()
            .checked_sub(1)
            .ok_or_else(|| TreeError::corrupt("rollback without an open transaction"))?;
        self.depth.set(depth);
        if depth == 0 {
            // SQLite may already have rolled back on its own after certain errors.
            if !self.conn.is_autocommit() {
                self.conn.execute_batch("ROLLBACK")?;
            }
        } else {
            self.conn.execute_batch(&format!(
                "ROLLBACK TO {SAVEPOINT_PREFIX}_{depth}; RELEASE {SAVEPOINT_PREFIX}_{depth}"
            ))?;
        }
        trace!(depth, "store.sqlite.rollback");
        Ok(())
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn field_name(field: Field) -> &'static str {
    match field {
        Field::Id => "id",
        Field::Parent => "parent",
        Field::Left => "left",
        Field::Right => "right",
        Field::Root => "root",
        Field::Level => "level",
    }
}
