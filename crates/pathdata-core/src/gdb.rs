//! Identifier graph store.
//!
//! Relational store of cross-reference links, per-identifier backpage text
//! and optional attributes (symbols). Lookups are read-only and never fail
//! for "not found"; a store with no open connection simply answers with
//! empty results.

use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::mapper::IdMapper;
use crate::storage::{
    DbConnection, OpenMode, Result, SchemaVariant, StorageBackend, StorageError, TableSet,
};
use crate::xref::{DataSource, Xref};

/// Attribute name holding gene symbols
pub const SYMBOL_ATTRIBUTE: &str = "Symbol";

/// One free-text search match
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SearchHit {
    pub xref: Xref,
    /// Symbol attribute of the match, when the database has one
    pub symbol: Option<String>,
}

/// Store of `hub -> leaf` links and identifier metadata
#[derive(Debug, Default)]
pub struct IdentifierGraphStore {
    conn: Option<DbConnection>,
    /// Name the database was opened under (archive path for archive backends)
    name: Option<PathBuf>,
    /// Whether the optional `attribute` table exists
    has_attributes: bool,
}

impl IdentifierGraphStore {
    /// A store with no connection; every lookup returns empty.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Open an existing identifier graph read-only.
    pub fn open(backend: &dyn StorageBackend, name: &Path) -> Result<Self> {
        let conn = backend.open(name, OpenMode::Read)?;
        let has_attributes = conn.has_table("attribute")?;
        info!(
            "Opened identifier graph {} (schema v{})",
            name.display(),
            conn.variant().version()
        );
        Ok(Self {
            conn: Some(conn),
            name: Some(name.to_path_buf()),
            has_attributes,
        })
    }

    /// Create a new, empty identifier graph for building.
    pub fn create(backend: &dyn StorageBackend, name: &Path) -> Result<Self> {
        let mut conn = backend.open(name, OpenMode::Create)?;
        backend.create_schema(&mut conn, TableSet::IdentifierGraph)?;
        info!("Created identifier graph {}", name.display());
        Ok(Self {
            conn: Some(conn),
            name: Some(name.to_path_buf()),
            has_attributes: true,
        })
    }

    /// Wrap an already open connection holding identifier-graph tables.
    pub fn from_connection(conn: DbConnection) -> Result<Self> {
        let has_attributes = conn.has_table("attribute")?;
        Ok(Self {
            conn: Some(conn),
            name: None,
            has_attributes,
        })
    }

    /// In-memory writable store (for testing)
    pub fn in_memory() -> Result<Self> {
        let mut conn = DbConnection::in_memory()?;
        conn.recreate(TableSet::IdentifierGraph)?;
        Self::from_connection(conn)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn name(&self) -> Option<&Path> {
        self.name.as_deref()
    }

    /// Schema variant of the open connection
    pub fn variant(&self) -> Option<SchemaVariant> {
        self.conn.as_ref().map(DbConnection::variant)
    }

    /// Schema version, 0 when disconnected
    pub fn schema_version(&self) -> i64 {
        self.variant().map(|v| v.version()).unwrap_or(0)
    }

    /// True when the node table is still named `gene`
    pub fn is_legacy(&self) -> bool {
        self.variant().is_some_and(|v| v.is_legacy())
    }

    fn writer(&self, operation: &str) -> Result<&DbConnection> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| StorageError::not_connected(operation))?;
        conn.begin()?;
        Ok(conn)
    }

    // ========== Building ==========

    /// Insert a `hub -> leaf` link. Returns false if it already existed.
    pub fn add_link(&self, hub: &Xref, leaf: &Xref, bridge: Option<&str>) -> Result<bool> {
        let conn = self.writer("add link")?;
        let inserted = conn.sql().prepare_cached(
            "INSERT OR IGNORE INTO link (idLeft, codeLeft, idRight, codeRight, bridge)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![hub.id(), hub.code(), leaf.id(), leaf.code(), bridge])?;
        Ok(inserted > 0)
    }

    /// Insert or replace the backpage text of `xref`.
    pub fn add_datanode(&self, xref: &Xref, backpage: Option<&str>) -> Result<()> {
        let conn = self.writer("add datanode")?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, code, backpageText) VALUES (?1, ?2, ?3)",
            conn.variant().node_table()
        );
        conn.sql()
            .prepare_cached(&sql)?
            .execute(params![xref.id(), xref.code(), backpage])?;
        Ok(())
    }

    /// Attach an attribute (e.g. [`SYMBOL_ATTRIBUTE`]) to `xref`.
    pub fn add_attribute(&self, xref: &Xref, name: &str, value: &str) -> Result<()> {
        let conn = self.writer("add attribute")?;
        conn.sql()
            .prepare_cached(
                "INSERT INTO attribute (id, code, attrname, attrvalue) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![xref.id(), xref.code(), name, value])?;
        Ok(())
    }

    /// Commit pending writes.
    pub fn commit(&self) -> Result<()> {
        match &self.conn {
            Some(conn) => conn.commit(),
            None => Ok(()),
        }
    }

    /// Compact, close and package a freshly built graph.
    pub fn finalize(mut self, backend: &dyn StorageBackend) -> Result<PathBuf> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StorageError::not_connected("finalize identifier graph"))?;
        let name = self
            .name
            .take()
            .ok_or_else(|| StorageError::connection("in-memory graph cannot be finalized"))?;
        backend.compact(&conn)?;
        conn.close()?;
        backend.finalize(&name)
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()?;
        }
        Ok(())
    }

    // ========== Lookups ==========

    /// Backpage text of `xref`, if any.
    pub fn backpage_text(&self, xref: &Xref) -> Result<Option<String>> {
        let Some(conn) = &self.conn else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT backpageText FROM {} WHERE id = ?1 AND code = ?2",
            conn.variant().node_table()
        );
        let text = conn
            .sql()
            .prepare_cached(&sql)?
            .query_row(params![xref.id(), xref.code()], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(text.flatten())
    }

    /// Distinct symbols starting with `prefix`, at most `limit`.
    pub fn symbol_suggestions(
        &self,
        prefix: &str,
        limit: usize,
        case_sensitive: bool,
    ) -> Result<Vec<String>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };
        if !self.has_attributes {
            return Ok(Vec::new());
        }

        let filter = prefix_filter("attrvalue", case_sensitive);
        let sql = format!(
            "SELECT DISTINCT attrvalue FROM attribute
             WHERE attrname = '{SYMBOL_ATTRIBUTE}' AND {filter}
             ORDER BY attrvalue LIMIT ?3"
        );
        let mut stmt = conn.sql().prepare_cached(&sql)?;
        let (pattern, len) = prefix_params(prefix, case_sensitive);
        let rows = stmt.query_map(params![pattern, len, limit_param(limit)], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    /// Identifiers starting with `prefix`, at most `limit`.
    pub fn id_suggestions(
        &self,
        prefix: &str,
        limit: usize,
        case_sensitive: bool,
    ) -> Result<Vec<Xref>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };

        let filter = prefix_filter("id", case_sensitive);
        let sql = format!(
            "SELECT id, code FROM {} WHERE {filter} ORDER BY id, code LIMIT ?3",
            conn.variant().node_table()
        );
        let mut stmt = conn.sql().prepare_cached(&sql)?;
        let (pattern, len) = prefix_params(prefix, case_sensitive);
        let rows = stmt.query_map(params![pattern, len, limit_param(limit)], |row| {
            Ok(Xref::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?.as_str()))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Identifiers whose id, backpage text or attribute values contain
    /// `text` (case-insensitive), at most `limit`.
    pub fn free_text_search(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };

        let node_table = conn.variant().node_table();
        let sql = if self.has_attributes {
            format!(
                "SELECT n.id, n.code,
                        (SELECT a.attrvalue FROM attribute a
                          WHERE a.id = n.id AND a.code = n.code AND a.attrname = '{SYMBOL_ATTRIBUTE}'
                          LIMIT 1)
                 FROM {node_table} n
                 WHERE n.id LIKE ?1 ESCAPE '\\'
                    OR n.backpageText LIKE ?1 ESCAPE '\\'
                    OR EXISTS (SELECT 1 FROM attribute a
                                WHERE a.id = n.id AND a.code = n.code
                                  AND a.attrvalue LIKE ?1 ESCAPE '\\')
                 ORDER BY n.id, n.code
                 LIMIT ?2"
            )
        } else {
            format!(
                "SELECT n.id, n.code, NULL
                 FROM {node_table} n
                 WHERE n.id LIKE ?1 ESCAPE '\\' OR n.backpageText LIKE ?1 ESCAPE '\\'
                 ORDER BY n.id, n.code
                 LIMIT ?2"
            )
        };

        let pattern = format!("%{}%", escape_like(text));
        let mut stmt = conn.sql().prepare_cached(&sql)?;
        let rows = stmt.query_map(params![pattern, limit_param(limit)], |row| {
            Ok(SearchHit {
                xref: Xref::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?.as_str()),
                symbol: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========== Statistics ==========

    /// Number of links, 0 when disconnected
    pub fn link_count(&self) -> Result<u64> {
        self.count("link")
    }

    /// Number of datanode rows, 0 when disconnected
    pub fn datanode_count(&self) -> Result<u64> {
        match self.variant() {
            Some(variant) => self.count(variant.node_table()),
            None => Ok(0),
        }
    }

    fn count(&self, table: &str) -> Result<u64> {
        let Some(conn) = &self.conn else {
            return Ok(0);
        };
        let count: i64 = conn
            .sql()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl IdMapper for IdentifierGraphStore {
    fn resolve_to_hub(&self, xref: &Xref) -> Result<Vec<String>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.sql().prepare_cached(
            "SELECT DISTINCT idLeft FROM link WHERE idRight = ?1 AND codeRight = ?2 ORDER BY idLeft",
        )?;
        let rows = stmt.query_map(params![xref.id(), xref.code()], |row| row.get(0))?;
        let hubs = rows.collect::<rusqlite::Result<Vec<String>>>()?;
        debug!("{} resolved to {} hub(s)", xref, hubs.len());
        Ok(hubs)
    }

    fn hub_leaves(&self, hub: &str, filter: Option<&DataSource>) -> Result<Vec<Xref>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };
        let to_xref = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Xref> {
            Ok(Xref::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?.as_str()))
        };
        let leaves = match filter {
            Some(source) => {
                let mut stmt = conn.sql().prepare_cached(
                    "SELECT idRight, codeRight FROM link WHERE idLeft = ?1 AND codeRight = ?2",
                )?;
                let rows = stmt.query_map(params![hub, source.code()], to_xref)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn
                    .sql()
                    .prepare_cached("SELECT idRight, codeRight FROM link WHERE idLeft = ?1")?;
                let rows = stmt.query_map(params![hub], to_xref)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(leaves)
    }
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// WHERE fragment matching `column` against prefix parameters ?1 and ?2.
///
/// SQLite's LIKE ignores ASCII case, so case-sensitive matching compares a
/// substring instead.
fn prefix_filter(column: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        format!("substr({column}, 1, ?2) = ?1")
    } else {
        format!("({column} LIKE ?1 ESCAPE '\\' AND ?2 >= 0)")
    }
}

fn prefix_params(prefix: &str, case_sensitive: bool) -> (String, i64) {
    let len = prefix.chars().count() as i64;
    if case_sensitive {
        (prefix.to_string(), len)
    } else {
        (format!("{}%", escape_like(prefix)), len)
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
