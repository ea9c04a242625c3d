//! Storage backend trait and its two connectors.

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::archive;
use super::connection::DbConnection;
use super::schema::TableSet;
use super::{Result, StorageError};

/// File name of the SQLite database inside a working directory
const WORKING_DB_FILE: &str = "data.sqlite";

/// Suffix appended to an archive path to name its working directory
const WORKING_DIR_SUFFIX: &str = "d";

/// How a database is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start from an empty database, discarding any previous contents
    Create,
    /// Open an existing database for queries only
    Read,
}

/// Connector that knows where a named database lives and how to package it.
///
/// `name` is always the path callers use to refer to the database; backends
/// may keep the live data somewhere else while it is being written.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Short backend identifier used in logs and configuration
    fn kind(&self) -> BackendKind;

    /// Open `name` in `mode`.
    fn open(&self, name: &Path, mode: OpenMode) -> Result<DbConnection>;

    /// Drop and recreate the tables of `tables` on a writable connection.
    fn create_schema(&self, conn: &mut DbConnection, tables: TableSet) -> Result<()> {
        conn.recreate(tables)
    }

    /// Reclaim free pages and refresh planner statistics.
    fn compact(&self, conn: &DbConnection) -> Result<()> {
        conn.ensure_writable("compact")?;
        conn.commit()?;
        conn.sql().execute_batch("VACUUM; ANALYZE;")?;
        debug!("Compacted {}", conn.path().display());
        Ok(())
    }

    /// Turn a freshly built database into its distributable form.
    ///
    /// Must be called after the writing connection is closed. Calling it
    /// again on an already finalized database is a no-op that returns the
    /// same path.
    fn finalize(&self, name: &Path) -> Result<PathBuf>;
}

/// Available backend implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain single-file SQLite
    Sqlite,
    /// Working directory packed into a zip archive on finalize
    #[default]
    Archive,
}

impl BackendKind {
    /// Instantiate the backend this kind names.
    pub fn create(self) -> Arc<dyn StorageBackend> {
        match self {
            BackendKind::Sqlite => Arc::new(SqliteBackend),
            BackendKind::Archive => Arc::new(ArchiveBackend),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Archive => "archive",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "archive" | "zip" => Ok(Self::Archive),
            _ => Err(format!(
                "Unknown storage backend: '{}'. Valid values: sqlite, archive",
                s
            )),
        }
    }
}

/// Remove a SQLite file together with its journal sidecars.
fn remove_sqlite_file(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            fs::remove_file(&candidate)?;
        }
    }
    Ok(())
}

fn open_writable(path: &Path) -> Result<DbConnection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)
        .map_err(|e| StorageError::connection(format!("{}: {e}", path.display())))?;
    DbConnection::writable(conn, path.to_path_buf())
}

fn open_read_only(path: &Path) -> Result<DbConnection> {
    if !path.exists() {
        return Err(StorageError::database_missing(path));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| StorageError::connection(format!("{}: {e}", path.display())))?;
    DbConnection::read_only(conn, path.to_path_buf())
}

/// Single-file SQLite backend.
///
/// `name` is the database file itself; finalize only folds the write-ahead
/// log back into it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

impl StorageBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn open(&self, name: &Path, mode: OpenMode) -> Result<DbConnection> {
        match mode {
            OpenMode::Create => {
                remove_sqlite_file(name)?;
                open_writable(name)
            }
            OpenMode::Read => open_read_only(name),
        }
    }

    fn finalize(&self, name: &Path) -> Result<PathBuf> {
        if !name.exists() {
            return Err(StorageError::database_missing(name));
        }
        let conn = Connection::open(name)?;
        conn.pragma_update_and_check(None, "journal_mode", "DELETE", |_| Ok(()))?;
        conn.close().map_err(|(_, err)| StorageError::from(err))?;
        info!("Finalized {}", name.display());
        Ok(name.to_path_buf())
    }
}

/// Directory-backed backend packed into a zip archive.
///
/// While a database is being built it lives in `<name>.d/data.sqlite`.
/// [`StorageBackend::finalize`] packs that directory into `<name>` and removes
/// it; opening `<name>` for reading unpacks the archive back into the
/// working directory first.
///
/// Every reader of `<name>` shares that one working directory, and each read
/// open deletes and re-unpacks it. Close other handles on the same archive
/// before opening it again.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveBackend;

impl ArchiveBackend {
    /// Working directory used for `name`
    pub fn working_dir(name: &Path) -> PathBuf {
        let mut dir = name.as_os_str().to_owned();
        dir.push(".");
        dir.push(WORKING_DIR_SUFFIX);
        PathBuf::from(dir)
    }

    fn working_db(name: &Path) -> PathBuf {
        Self::working_dir(name).join(WORKING_DB_FILE)
    }
}

impl StorageBackend for ArchiveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Archive
    }

    fn open(&self, name: &Path, mode: OpenMode) -> Result<DbConnection> {
        let work_dir = Self::working_dir(name);
        match mode {
            OpenMode::Create => {
                if work_dir.exists() {
                    fs::remove_dir_all(&work_dir)?;
                }
                fs::create_dir_all(&work_dir)?;
                open_writable(&Self::working_db(name))
            }
            OpenMode::Read => {
                if name.is_file() {
                    debug!(
                        "Unpacking {} into {}",
                        name.display(),
                        work_dir.display()
                    );
                    archive::unpack(name, &work_dir)?;
                } else if !work_dir.is_dir() {
                    return Err(StorageError::database_missing(name));
                }
                open_read_only(&Self::working_db(name))
            }
        }
    }

    fn finalize(&self, name: &Path) -> Result<PathBuf> {
        let work_dir = Self::working_dir(name);
        if !work_dir.is_dir() {
            if name.is_file() {
                debug!("{} already finalized", name.display());
                return Ok(name.to_path_buf());
            }
            return Err(StorageError::database_missing(name));
        }

        // Fold any WAL left by a connection that was dropped without close()
        let db_path = Self::working_db(name);
        if db_path.exists() {
            let conn = Connection::open(&db_path)?;
            conn.pragma_update_and_check(None, "journal_mode", "DELETE", |_| Ok(()))?;
            conn.close().map_err(|(_, err)| StorageError::from(err))?;
        }

        let bytes = archive::pack_dir(&work_dir, name)?;
        fs::remove_dir_all(&work_dir)?;
        info!("Finalized {} ({} bytes packed)", name.display(), bytes);
        Ok(name.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build(backend: &dyn StorageBackend, name: &Path) {
        let mut conn = backend.open(name, OpenMode::Create).unwrap();
        backend
            .create_schema(&mut conn, TableSet::Expression)
            .unwrap();
        conn.sql()
            .execute(
                "INSERT INTO samples (idSample, name, dataType) VALUES (0, 'ctrl', 7)",
                [],
            )
            .unwrap();
        backend.compact(&conn).unwrap();
        conn.close().unwrap();
    }

    fn sample_count(conn: &DbConnection) -> i64 {
        conn.sql()
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_sqlite_roundtrip() {
        let temp = TempDir::new().unwrap();
        let name = temp.path().join("data.pgex");
        let backend = SqliteBackend;

        build(&backend, &name);
        assert_eq!(backend.finalize(&name).unwrap(), name);

        let conn = backend.open(&name, OpenMode::Read).unwrap();
        assert!(conn.is_read_only());
        assert_eq!(sample_count(&conn), 1);
    }

    #[test]
    fn test_sqlite_create_discards_previous() {
        let temp = TempDir::new().unwrap();
        let name = temp.path().join("data.pgex");
        let backend = SqliteBackend;
        build(&backend, &name);

        let mut conn = backend.open(&name, OpenMode::Create).unwrap();
        backend
            .create_schema(&mut conn, TableSet::Expression)
            .unwrap();
        assert_eq!(sample_count(&conn), 0);
    }

    #[test]
    fn test_archive_finalize_packs_and_removes_working_dir() {
        let temp = TempDir::new().unwrap();
        let name = temp.path().join("data.pgex");
        let backend = ArchiveBackend;

        build(&backend, &name);
        assert!(ArchiveBackend::working_dir(&name).is_dir());

        let finalized = backend.finalize(&name).unwrap();
        assert_eq!(finalized, name);
        assert!(name.is_file());
        assert!(!ArchiveBackend::working_dir(&name).exists());

        let conn = backend.open(&name, OpenMode::Read).unwrap();
        assert_eq!(sample_count(&conn), 1);
    }

    #[test]
    fn test_archive_readers_share_working_dir() {
        let temp = TempDir::new().unwrap();
        let name = temp.path().join("data.pgex");
        let backend = ArchiveBackend;
        build(&backend, &name);
        backend.finalize(&name).unwrap();

        let first = backend.open(&name, OpenMode::Read).unwrap();
        assert_eq!(sample_count(&first), 1);
        first.close().unwrap();

        let work_dir = ArchiveBackend::working_dir(&name);
        fs::write(work_dir.join("scratch.txt"), b"left by a reader").unwrap();

        // The next read open unpacks into the same directory from scratch
        let second = backend.open(&name, OpenMode::Read).unwrap();
        assert_eq!(second.path(), ArchiveBackend::working_db(&name).as_path());
        assert!(!work_dir.join("scratch.txt").exists());
        assert_eq!(sample_count(&second), 1);
    }

    #[test]
    fn test_archive_finalize_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let name = temp.path().join("data.pgex");
        let backend = ArchiveBackend;
        build(&backend, &name);

        backend.finalize(&name).unwrap();
        // Second call sees no working dir and the archive already in place
        assert_eq!(backend.finalize(&name).unwrap(), name);
    }

    #[test]
    fn test_open_missing_database() {
        let temp = TempDir::new().unwrap();
        let name = temp.path().join("missing.pgex");

        assert!(matches!(
            ArchiveBackend.open(&name, OpenMode::Read),
            Err(StorageError::DatabaseMissing { .. })
        ));
        assert!(matches!(
            SqliteBackend.open(&name, OpenMode::Read),
            Err(StorageError::DatabaseMissing { .. })
        ));
        assert!(matches!(
            ArchiveBackend.finalize(&name),
            Err(StorageError::DatabaseMissing { .. })
        ));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("ZIP".parse::<BackendKind>().unwrap(), BackendKind::Archive);
        assert!("derby".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::create(BackendKind::Sqlite).kind(), BackendKind::Sqlite);
    }
}
