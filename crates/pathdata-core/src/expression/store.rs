//! Relational store of raw expression values keyed by hub id.

use rusqlite::params;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::record::{ExpressionRecord, SampleValue};
use super::samples::{Sample, SampleCatalog, ValueType};
use crate::storage::schema::EXPRESSION_COLUMNS;
use crate::storage::{DbConnection, OpenMode, Result, StorageBackend, StorageError, TableSet};
use crate::xref::Xref;

const ROW_SAVEPOINT: &str = "import_row";

/// One stored value as returned by [`ExpressionStore::query_by_hub`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExpressionRow {
    pub reporter: Xref,
    pub sample_id: i32,
    pub group_id: i64,
    pub raw: String,
}

/// Merge raw rows into one record per group id, coercing values through the
/// sample catalog. Records come out in group id order.
pub fn merge_by_group(
    rows: impl IntoIterator<Item = RawExpressionRow>,
    samples: &SampleCatalog,
) -> Vec<ExpressionRecord> {
    let mut groups: BTreeMap<i64, ExpressionRecord> = BTreeMap::new();
    for row in rows {
        let value_type = samples.value_type(row.sample_id).unwrap_or(ValueType::Text);
        groups
            .entry(row.group_id)
            .or_insert_with(|| ExpressionRecord::new(row.reporter.clone(), row.group_id))
            .set_sample_data(row.sample_id, SampleValue::coerce(&row.raw, value_type));
    }
    groups.into_values().collect()
}

/// Expression dataset: sample catalog plus raw values
#[derive(Debug, Default)]
pub struct ExpressionStore {
    conn: Option<DbConnection>,
    name: Option<PathBuf>,
    samples: Arc<SampleCatalog>,
}

impl ExpressionStore {
    /// A store with no connection
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Create an empty dataset for import.
    pub fn create(backend: &dyn StorageBackend, name: &Path) -> Result<Self> {
        let mut conn = backend.open(name, OpenMode::Create)?;
        backend.create_schema(&mut conn, TableSet::Expression)?;
        info!("Created expression dataset {}", name.display());
        Ok(Self {
            conn: Some(conn),
            name: Some(name.to_path_buf()),
            samples: Arc::default(),
        })
    }

    /// Open an existing dataset read-only and load its sample catalog.
    pub fn open(backend: &dyn StorageBackend, name: &Path) -> Result<Self> {
        let conn = backend.open(name, OpenMode::Read)?;
        let samples = load_samples(&conn)?;
        info!(
            "Opened expression dataset {} ({} samples)",
            name.display(),
            samples.len()
        );
        Ok(Self {
            conn: Some(conn),
            name: Some(name.to_path_buf()),
            samples: Arc::new(samples),
        })
    }

    /// In-memory writable dataset (for testing)
    pub fn in_memory() -> Result<Self> {
        let mut conn = DbConnection::in_memory()?;
        conn.recreate(TableSet::Expression)?;
        Ok(Self {
            conn: Some(conn),
            name: None,
            samples: Arc::default(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn name(&self) -> Option<&Path> {
        self.name.as_deref()
    }

    /// Schema version, 0 when disconnected
    pub fn schema_version(&self) -> i64 {
        self.conn
            .as_ref()
            .map(|c| c.variant().version())
            .unwrap_or(0)
    }

    /// Shared handle to the sample catalog
    pub fn samples(&self) -> Arc<SampleCatalog> {
        Arc::clone(&self.samples)
    }

    fn connection(&self, operation: &str) -> Result<&DbConnection> {
        self.conn
            .as_ref()
            .ok_or_else(|| StorageError::not_connected(operation))
    }

    /// Declare a sample column. Names longer than the stored maximum are
    /// truncated.
    pub fn declare_sample(&mut self, id: i32, name: &str, value_type: ValueType) -> Result<Sample> {
        let sample = Sample::new(id, name, value_type);
        let conn = self.connection("declare sample")?;
        conn.begin()?;
        conn.sql()
            .prepare_cached(
                "INSERT OR REPLACE INTO samples (idSample, name, dataType) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![sample.id, sample.name, value_type.code()])?;
        Arc::make_mut(&mut self.samples).insert(sample.clone());
        debug!("Declared sample {} '{}' ({:?})", sample.id, sample.name, value_type);
        Ok(sample)
    }

    /// Append one raw value. Values are stored as text and coerced on read.
    pub fn append_expression(
        &self,
        reporter: &Xref,
        hub_id: &str,
        sample_ordinal: i32,
        raw: &str,
        group_id: i64,
    ) -> Result<()> {
        let conn = self.connection("append expression")?;
        conn.begin()?;
        conn.sql()
            .prepare_cached(
                "INSERT INTO expression (id, code, ensId, idSample, data, groupId)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                reporter.id(),
                reporter.code(),
                hub_id,
                sample_ordinal,
                raw,
                group_id
            ])?;
        Ok(())
    }

    /// All raw rows stored under `hub_id`, in insertion order.
    pub fn query_by_hub(&self, hub_id: &str) -> Result<Vec<RawExpressionRow>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {EXPRESSION_COLUMNS} FROM expression WHERE ensId = ?1 ORDER BY rowid"
        );
        let mut stmt = conn.sql().prepare_cached(&sql)?;
        let rows = stmt.query_map([hub_id], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            Ok(RawExpressionRow {
                reporter: Xref::new(id, code.as_str()),
                sample_id: row.get(2)?,
                group_id: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                raw: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Records stored under `hub_id`, merged per group.
    pub fn records_by_hub(&self, hub_id: &str) -> Result<Vec<ExpressionRecord>> {
        Ok(merge_by_group(self.query_by_hub(hub_id)?, &self.samples))
    }

    /// Open a transaction for a batch of writes.
    pub fn begin(&self) -> Result<()> {
        self.connection("begin")?.begin()
    }

    /// Start a group of appends that is kept or discarded as a whole.
    pub fn begin_row(&self) -> Result<()> {
        self.connection("begin row")?.savepoint(ROW_SAVEPOINT)
    }

    pub fn keep_row(&self) -> Result<()> {
        self.connection("keep row")?.release(ROW_SAVEPOINT)
    }

    /// Drop every append since [`ExpressionStore::begin_row`].
    pub fn discard_row(&self) -> Result<()> {
        self.connection("discard row")?.rollback_to(ROW_SAVEPOINT)
    }

    #[cfg(test)]
    pub(crate) fn execute_sql(&self, sql: &str) -> Result<()> {
        self.connection("execute")?.sql().execute_batch(sql)?;
        Ok(())
    }

    /// Commit the current batch.
    pub fn commit(&self) -> Result<()> {
        match &self.conn {
            Some(conn) => conn.commit(),
            None => Ok(()),
        }
    }

    /// Number of stored values, 0 when disconnected
    pub fn row_count(&self) -> Result<u64> {
        let Some(conn) = &self.conn else {
            return Ok(0);
        };
        let count: i64 = conn
            .sql()
            .query_row("SELECT COUNT(*) FROM expression", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Distinct hub ids with data, sorted, at most `limit`.
    pub fn hub_ids(&self, limit: usize) -> Result<Vec<String>> {
        let Some(conn) = &self.conn else {
            return Ok(Vec::new());
        };
        let mut stmt = conn
            .sql()
            .prepare_cached("SELECT DISTINCT ensId FROM expression ORDER BY ensId LIMIT ?1")?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()?;
        }
        Ok(())
    }

    /// Compact, close and package a freshly imported dataset.
    pub fn finalize(mut self, backend: &dyn StorageBackend) -> Result<PathBuf> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StorageError::not_connected("finalize expression dataset"))?;
        let name = self
            .name
            .take()
            .ok_or_else(|| StorageError::connection("in-memory dataset cannot be finalized"))?;
        backend.compact(&conn)?;
        conn.close()?;
        backend.finalize(&name)
    }
}

fn load_samples(conn: &DbConnection) -> Result<SampleCatalog> {
    let mut stmt = conn
        .sql()
        .prepare("SELECT idSample, name, dataType FROM samples ORDER BY idSample")?;
    let rows = stmt.query_map([], |row| {
        Ok(Sample::new(
            row.get(0)?,
            row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ValueType::from_code(row.get(2)?),
        ))
    })?;
    Ok(rows.collect::<rusqlite::Result<SampleCatalog>>()?)
}
