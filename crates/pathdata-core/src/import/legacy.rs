//! Conversion of expression databases that predate hub ids.
//!
//! Legacy datasets hold `samples(idSample, name, dataType)` and
//! `expression(id, code, idSample, data)`: values keyed by reporter only.
//! Consecutive rows of the same reporter form one group.

use rusqlite::types::ValueRef;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{abandon, BatchCommitter, ErrorLog, ImportError, ImportReport, Importer, RowError};
use crate::expression::{ExpressionStore, Sample, ValueType};
use crate::storage::{DbConnection, OpenMode, SqliteBackend, StorageBackend};
use crate::xref::{DataSource, Xref};

/// Reporter currently being converted
struct Group {
    reporter: (String, String),
    group_id: i64,
    /// Target xref and hubs; `None` when the reporter was skipped
    mapped: Option<(Xref, Arc<[String]>)>,
}

impl Importer<'_> {
    /// Convert the legacy single-file dataset at `source` into a new
    /// dataset at `target`.
    pub fn convert_legacy(&self, source: &Path, target: &Path) -> Result<ImportReport, ImportError> {
        let legacy = SqliteBackend.open(source, OpenMode::Read)?;
        let samples = read_legacy_samples(&legacy)?;
        info!(
            "Converting legacy dataset {} ({} samples) into {}",
            source.display(),
            samples.len(),
            target.display()
        );

        let mut store = ExpressionStore::create(self.backend, target)?;
        let mut errors = ErrorLog::new(target);
        let converted = self.convert_rows(&legacy, &samples, &mut store, &mut errors);
        if let Err(err) = legacy.close() {
            warn!("Failed to close legacy dataset {}: {}", source.display(), err);
        }
        match converted {
            Ok(report) => self.finish(store, errors, report),
            Err(err) => {
                abandon(store);
                Err(err)
            }
        }
    }

    fn convert_rows(
        &self,
        legacy: &DbConnection,
        samples: &[Sample],
        store: &mut ExpressionStore,
        errors: &mut ErrorLog,
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();
        for sample in samples {
            store.declare_sample(sample.id, &sample.name, sample.value_type)?;
        }
        store.commit()?;
        report.samples_declared = samples.len();

        let mut committer = BatchCommitter::new(self.settings().commit_every);
        let mut stmt = legacy
            .sql()
            .prepare("SELECT id, code, idSample, data FROM expression ORDER BY rowid")?;
        let mut rows = stmt.query([])?;
        let mut current: Option<Group> = None;

        while let Some(row) = rows.next()? {
            let id: String = row.get::<_, Option<String>>(0)?.unwrap_or_default();
            let code: String = row.get::<_, Option<String>>(1)?.unwrap_or_default();
            let sample_id: i32 = row.get(2)?;
            let raw = value_to_string(row.get_ref(3)?);

            let same_reporter = current
                .as_ref()
                .is_some_and(|g| g.reporter.0 == id && g.reporter.1 == code);
            if !same_reporter {
                if self.token.is_cancelled() {
                    info!("Conversion cancelled after {} reporter(s)", report.rows_read);
                    report.cancelled = true;
                    break;
                }
                report.rows_read += 1;
                self.report_progress(report.rows_read);

                let group_id = current.as_ref().map_or(0, |g| g.group_id + 1);
                let mapped = match self.map_reporter(&id, &code)? {
                    Ok(mapped) => {
                        report.rows_added += 1;
                        Some(mapped)
                    }
                    Err(row_error) => {
                        errors.record(report.rows_read, &row_error)?;
                        None
                    }
                };
                current = Some(Group {
                    reporter: (id, code),
                    group_id,
                    mapped,
                });
            }

            let Some(Group {
                group_id,
                mapped: Some((xref, hubs)),
                ..
            }) = &current
            else {
                continue;
            };
            for hub in hubs.iter() {
                store.append_expression(xref, hub, sample_id, &raw, *group_id)?;
                report.expression_rows += 1;
                committer.inserted(store, 1)?;
            }
        }

        store.commit()?;
        Ok(report)
    }

    fn map_reporter(
        &self,
        id: &str,
        code: &str,
    ) -> Result<Result<(Xref, Arc<[String]>), RowError>, ImportError> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(Err(RowError::EmptyIdentifier));
        }
        let source = match (code.trim(), &self.settings().default_source) {
            ("", Some(default)) => default.clone(),
            ("", None) => return Ok(Err(RowError::MissingCode(id.to_string()))),
            (code, _) => DataSource::lookup(code),
        };
        let xref = Xref::new(id, source);
        let hubs = self.mapper.resolve_to_hub(&xref)?;
        if hubs.is_empty() {
            return Ok(Err(RowError::Unmapped(xref)));
        }
        Ok(Ok((xref, hubs.into())))
    }
}

fn read_legacy_samples(legacy: &DbConnection) -> Result<Vec<Sample>, ImportError> {
    let mut stmt = legacy
        .sql()
        .prepare("SELECT idSample, name, dataType FROM samples ORDER BY idSample")?;
    let rows = stmt.query_map([], |row| {
        Ok(Sample::new(
            row.get(0)?,
            row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ValueType::from_code(row.get::<_, Option<i64>>(2)?.unwrap_or(0)),
        ))
    })?;
    let samples = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(samples)
}

/// Legacy `data` cells may hold any SQLite type; store them as text.
fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
