//! Pathdata Core - Expression data caching and cross-reference resolution
//!
//! This crate provides the engine behind pathway data overlays:
//! - Identifier graph store resolving ids across naming systems via hubs
//! - Expression dataset store with sample catalog and bulk import
//! - Aggregation cache averaging duplicate reporters per identifier
//! - Background caching pipeline with progress and cancellation
//! - Pluggable storage backends (single-file SQLite or zip archive)

pub mod cache;
pub mod cancel;
pub mod expression;
pub mod gdb;
pub mod import;
pub mod mapper;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod xref;

// Re-exports for convenience
pub use cache::CachedData;
pub use cancel::CancellationToken;
pub use xref::{DataSource, Xref, XrefParseError};

// Storage re-exports
pub use storage::{
    ArchiveBackend, BackendKind, DbConnection, OpenMode, SchemaVariant, SqliteBackend,
    StorageBackend, StorageError, TableSet, SCHEMA_VERSION,
};

// Store re-exports
pub use expression::{
    ExpressionRecord, ExpressionStore, RawExpressionRow, Sample, SampleCatalog, SampleValue,
    ValueType,
};
pub use gdb::{IdentifierGraphStore, SearchHit, SYMBOL_ATTRIBUTE};
pub use mapper::{IdMapper, LinkIndex};

// Pipeline and import re-exports
pub use import::{
    error_file_path, ImportError, ImportReport, ImportSettings, Importer, RowError,
};
pub use pipeline::{
    CachingEvent, CachingHandle, CachingPipeline, PipelineError, RunState, RunSummary,
    SharedMapper, DEFAULT_HUB_MEMO_CAPACITY,
};
pub use session::Session;
