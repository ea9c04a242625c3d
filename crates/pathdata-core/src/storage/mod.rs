//! Storage Backend Module
//!
//! Pluggable connectors that create, open and finalize the relational
//! databases behind the identifier graph and the expression dataset.
//!
//! # Architecture
//!
//! ```text
//! StorageBackend (trait)
//! ├── SqliteBackend   single SQLite file, finalize = checkpoint
//! └── ArchiveBackend  working directory while building,
//!                     zip archive once finalized
//!
//! DbConnection
//! ├── rusqlite::Connection
//! ├── read-only flag
//! └── SchemaVariant (table naming, picked once at open)
//! ```

pub mod archive;
pub mod backend;
pub mod connection;
pub mod schema;

use std::path::PathBuf;
use thiserror::Error;

pub use backend::{ArchiveBackend, BackendKind, OpenMode, SqliteBackend, StorageBackend};
pub use connection::DbConnection;
pub use schema::{SchemaVariant, TableSet, MAX_NAME_LENGTH, SCHEMA_VERSION};

/// Errors that can occur while opening, writing or packaging a database
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("database not found at '{path}'")]
    DatabaseMissing { path: PathBuf },

    #[error("unsupported schema version {found} (newest supported is {supported})")]
    UnsupportedSchema { found: i64, supported: i64 },

    #[error("connection is read-only: {0}")]
    ReadOnly(String),

    #[error("no open connection: {0}")]
    NotConnected(String),

    #[error("connection failed: {0}")]
    Connection(String),
}

impl StorageError {
    /// Create a DatabaseMissing error.
    pub fn database_missing(path: impl Into<PathBuf>) -> Self {
        Self::DatabaseMissing { path: path.into() }
    }

    /// Create a Connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a NotConnected error.
    pub fn not_connected(what: impl Into<String>) -> Self {
        Self::NotConnected(what.into())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
