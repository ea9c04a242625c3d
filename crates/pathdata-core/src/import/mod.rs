//! Bulk loading of expression datasets.
//!
//! Two sources are supported:
//! - delimited text files ([`Importer::import_delimited`])
//! - expression databases written before hub ids existed
//!   ([`Importer::convert_legacy`])
//!
//! Every reporter is resolved through an [`IdMapper`] and one row per
//! (hub, sample) is appended to a new [`ExpressionStore`]. Rows that cannot
//! be imported are written to `<dbname>.ex.txt` and skipped; only storage
//! and input failures abort the run.

mod delimited;
mod legacy;

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::expression::ExpressionStore;
use crate::mapper::IdMapper;
use crate::storage::{StorageBackend, StorageError};
use crate::xref::{DataSource, Xref};

/// Rows inserted between commits by default
pub const DEFAULT_COMMIT_EVERY: usize = 1000;

/// Rows inspected to decide whether a sample column is numeric
pub const DEFAULT_TYPE_SNIFF_ROWS: usize = 100;

/// Suffix of the per-row error report
pub const ERROR_FILE_EXTENSION: &str = "ex.txt";

/// Fatal import failures
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read delimited input: {0}")]
    Csv(#[from] csv::Error),

    #[error("input '{0}' contains no rows")]
    EmptyInput(PathBuf),

    #[error("invalid import settings: {0}")]
    InvalidSettings(String),
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.into())
    }
}

impl ImportError {
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings(message.into())
    }
}

/// Why a single row was skipped
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("empty identifier")]
    EmptyIdentifier,

    #[error("no system code for identifier '{0}'")]
    MissingCode(String),

    #[error("{0} has no hub mapping")]
    Unmapped(Xref),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("unreadable row: {0}")]
    Unreadable(String),
}

/// How to read the input
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub delimiter: u8,
    /// First row names the columns
    pub has_header: bool,
    /// 0-based column holding the reporter identifier
    pub id_column: usize,
    /// 0-based column holding the system code, if any
    pub code_column: Option<usize>,
    /// Source used when there is no code column or its cell is empty
    pub default_source: Option<DataSource>,
    pub commit_every: usize,
    pub type_sniff_rows: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            has_header: true,
            id_column: 0,
            code_column: None,
            default_source: None,
            commit_every: DEFAULT_COMMIT_EVERY,
            type_sniff_rows: DEFAULT_TYPE_SNIFF_ROWS,
        }
    }
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Data rows (or legacy reporters) read from the input
    pub rows_read: usize,
    /// Rows that produced expression data
    pub rows_added: usize,
    /// Rows written to the error report
    pub errors: usize,
    /// Error report location; `None` when there were no errors
    pub error_file: Option<PathBuf>,
    pub samples_declared: usize,
    /// Values written to the expression table
    pub expression_rows: usize,
    /// Stopped early; the dataset was committed but not finalized
    pub cancelled: bool,
    /// Final location of the dataset when finalized
    pub database: Option<PathBuf>,
}

/// Path of the error report for `target`
pub fn error_file_path(target: &Path) -> PathBuf {
    target.with_extension(ERROR_FILE_EXTENSION)
}

/// Per-row error report, created on the first error.
struct ErrorLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    count: usize,
}

impl ErrorLog {
    fn new(target: &Path) -> Self {
        Self {
            path: error_file_path(target),
            writer: None,
            count: 0,
        }
    }

    fn record(&mut self, line: usize, error: &RowError) -> std::io::Result<()> {
        debug!("Skipping line {}: {}", line, error);
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => BufWriter::new(File::create(&self.path)?),
        };
        let writer = self.writer.insert(writer);
        writeln!(writer, "Line {line}:\t{error}")?;
        self.count += 1;
        Ok(())
    }

    /// Flush the report, deleting any stale file when nothing was recorded.
    fn finish(mut self) -> std::io::Result<Option<PathBuf>> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush()?;
                warn!("{} row(s) skipped; see {}", self.count, self.path.display());
                Ok(Some(self.path))
            }
            None => {
                if self.path.exists() {
                    fs::remove_file(&self.path)?;
                }
                Ok(None)
            }
        }
    }
}

/// Commits every `commit_every` inserted values.
struct BatchCommitter {
    commit_every: usize,
    pending: usize,
}

impl BatchCommitter {
    fn new(commit_every: usize) -> Self {
        Self {
            commit_every: commit_every.max(1),
            pending: 0,
        }
    }

    fn inserted(&mut self, store: &ExpressionStore, count: usize) -> Result<(), StorageError> {
        self.pending += count;
        if self.pending >= self.commit_every {
            store.commit()?;
            debug!("Committed batch of {} value(s)", self.pending);
            self.pending = 0;
        }
        Ok(())
    }
}

/// Shared state of one import run
pub struct Importer<'a> {
    mapper: &'a dyn IdMapper,
    backend: &'a dyn StorageBackend,
    settings: ImportSettings,
    token: CancellationToken,
    progress: Option<Box<dyn Fn(usize) + 'a>>,
}

impl<'a> Importer<'a> {
    pub fn new(mapper: &'a dyn IdMapper, backend: &'a dyn StorageBackend) -> Self {
        Self {
            mapper,
            backend,
            settings: ImportSettings::default(),
            token: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Stop between rows once `token` is cancelled.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Called with the number of rows read so far.
    pub fn on_progress(mut self, callback: impl Fn(usize) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    fn report_progress(&self, rows: usize) {
        if let Some(callback) = &self.progress {
            callback(rows);
        }
    }

    /// Finalize or, when cancelled, just commit and close the store.
    fn finish(
        &self,
        mut store: ExpressionStore,
        errors: ErrorLog,
        mut report: ImportReport,
    ) -> Result<ImportReport, ImportError> {
        report.errors = errors.count;
        report.error_file = errors.finish()?;
        if report.cancelled {
            store.commit()?;
            store.close()?;
        } else {
            report.database = Some(store.finalize(self.backend)?);
        }
        Ok(report)
    }
}

/// Close a store left behind by a failed run, logging secondary errors.
fn abandon(mut store: ExpressionStore) {
    if let Err(err) = store.close() {
        warn!("Failed to close partially imported dataset: {}", err);
    }
}
