//! Connection wrapper shared by both stores.

use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::schema::{SchemaVariant, TableSet, SCHEMA_VERSION};
use super::{Result, StorageError};

/// An open database plus the facts fixed at open time.
pub struct DbConnection {
    conn: Connection,
    /// Path of the SQLite file actually opened
    path: PathBuf,
    read_only: bool,
    variant: SchemaVariant,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("variant", &self.variant)
            .finish()
    }
}

impl DbConnection {
    /// Wrap a freshly opened writable connection.
    ///
    /// The variant is current until a table set is created; a database
    /// with no `info` table yet has nothing to branch on.
    pub(crate) fn writable(conn: Connection, path: PathBuf) -> Result<Self> {
        configure_writable(&conn)?;
        Ok(Self {
            conn,
            path,
            read_only: false,
            variant: SchemaVariant::current(),
        })
    }

    /// Wrap a read-only connection, reading the schema version once.
    pub(crate) fn read_only(conn: Connection, path: PathBuf) -> Result<Self> {
        configure_read_only(&conn)?;
        let variant = read_variant(&conn)?;
        debug!(
            "Opened {} read-only (schema v{}, node table '{}')",
            path.display(),
            variant.version(),
            variant.node_table()
        );
        Ok(Self {
            conn,
            path,
            read_only: true,
            variant,
        })
    }

    /// In-memory writable database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::writable(conn, PathBuf::from(":memory:"))
    }

    /// Drop and recreate `tables`.
    pub fn recreate(&mut self, tables: TableSet) -> Result<()> {
        self.ensure_writable("create schema")?;
        tables.recreate(&self.conn)?;
        self.variant = SchemaVariant::current();
        debug!("Created {:?} tables in {}", tables, self.path.display());
        Ok(())
    }

    pub(crate) fn sql(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn variant(&self) -> SchemaVariant {
        self.variant
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        table_exists(&self.conn, name)
    }

    /// Fail with [`StorageError::ReadOnly`] on read-only connections.
    pub fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly(operation.to_string()));
        }
        Ok(())
    }

    /// Open a transaction unless one is already open.
    ///
    /// Writers call this once and then [`DbConnection::commit`] at the
    /// boundaries they choose; the next write reopens the transaction.
    pub fn begin(&self) -> Result<()> {
        self.ensure_writable("begin transaction")?;
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Commit the open transaction, if any.
    pub fn commit(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            trace!("Committing transaction on {}", self.path.display());
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Open a transaction if needed and mark a savepoint inside it.
    pub fn savepoint(&self, name: &str) -> Result<()> {
        self.begin()?;
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    /// Keep the writes made since `name`.
    pub fn release(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE {name}"))?;
        Ok(())
    }

    /// Undo the writes made since `name` and drop the savepoint.
    pub fn rollback_to(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        Ok(())
    }

    /// Roll back the open transaction, if any.
    pub fn rollback(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Commit pending work and close the underlying connection.
    ///
    /// Writable connections leave WAL mode on the way out so the file can
    /// later be opened read-only without sidecar files.
    pub fn close(self) -> Result<()> {
        if !self.read_only {
            self.commit()?;
            self.conn
                .pragma_update_and_check(None, "journal_mode", "DELETE", |_| Ok(()))?;
        }
        let path = self.path.clone();
        self.conn.close().map_err(|(_, err)| StorageError::from(err))?;
        debug!("Closed {}", path.display());
        Ok(())
    }
}

/// Pragmas for connections that build or import databases
fn configure_writable(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", -64000)?; // 64MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

/// Pragmas for query-only connections
fn configure_read_only(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "cache_size", -16000)?; // 16MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268435456)?; // 256MB mmap
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Read `info.schemaversion`. Databases without an info row predate it and
/// are treated as version 0.
fn read_variant(conn: &Connection) -> Result<SchemaVariant> {
    let version = if table_exists(conn, "info")? {
        conn.query_row("SELECT schemaversion FROM info LIMIT 1", [], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?
        .unwrap_or(0)
    } else {
        0
    };

    if version > SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchema {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(SchemaVariant::for_version(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OpenFlags;
    use tempfile::TempDir;

    #[test]
    fn test_read_variant_without_info_is_legacy() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE gene (id TEXT, code TEXT, backpageText TEXT)", [])
            .unwrap();
        let variant = read_variant(&conn).unwrap();
        assert_eq!(variant.version(), 0);
        assert_eq!(variant.node_table(), "gene");
    }

    #[test]
    fn test_read_variant_rejects_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE info (schemaversion INTEGER)", [])
            .unwrap();
        conn.execute("INSERT INTO info VALUES (?1)", [SCHEMA_VERSION + 1])
            .unwrap();
        assert!(matches!(
            read_variant(&conn),
            Err(StorageError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ro.sqlite");
        {
            let mut db = DbConnection::writable(Connection::open(&path).unwrap(), path.clone())
                .unwrap();
            db.recreate(TableSet::Expression).unwrap();
            db.close().unwrap();
        }

        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY).unwrap();
        let mut db = DbConnection::read_only(conn, path).unwrap();
        assert!(db.is_read_only());
        assert_eq!(db.variant(), SchemaVariant::current());
        assert!(matches!(
            db.recreate(TableSet::Expression),
            Err(StorageError::ReadOnly(_))
        ));
        assert!(matches!(db.begin(), Err(StorageError::ReadOnly(_))));
    }

    #[test]
    fn test_begin_commit_are_reentrant() {
        let mut db = DbConnection::in_memory().unwrap();
        db.recreate(TableSet::Expression).unwrap();

        db.begin().unwrap();
        db.begin().unwrap();
        db.sql()
            .execute(
                "INSERT INTO samples (idSample, name, dataType) VALUES (1, 's', 7)",
                [],
            )
            .unwrap();
        db.commit().unwrap();
        db.commit().unwrap();

        let count: i64 = db
            .sql()
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_has_table() {
        let mut db = DbConnection::in_memory().unwrap();
        assert!(!db.has_table("link").unwrap());
        db.recreate(TableSet::IdentifierGraph).unwrap();
        assert!(db.has_table("link").unwrap());
        assert!(!db.has_table("expression").unwrap());
    }
}
