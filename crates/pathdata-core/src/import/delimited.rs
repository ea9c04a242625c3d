//! Delimited text import.

use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::info;

use super::{abandon, BatchCommitter, ErrorLog, ImportError, ImportReport, Importer, RowError};
use crate::expression::{ExpressionStore, ValueType};
use crate::storage::StorageError;
use crate::xref::{DataSource, Xref};

/// Where the identifier, code and sample values sit in each row
#[derive(Debug)]
struct ColumnLayout {
    width: usize,
    id_column: usize,
    code_column: Option<usize>,
    /// (column index, header) per sample, in sample id order
    samples: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn new(
        headers: &[String],
        id_column: usize,
        code_column: Option<usize>,
        default_source: Option<&DataSource>,
    ) -> Result<Self, ImportError> {
        let width = headers.len();
        if id_column >= width {
            return Err(ImportError::invalid_settings(format!(
                "identifier column {id_column} out of range ({width} columns)"
            )));
        }
        match code_column {
            Some(col) if col >= width => {
                return Err(ImportError::invalid_settings(format!(
                    "code column {col} out of range ({width} columns)"
                )));
            }
            Some(col) if col == id_column => {
                return Err(ImportError::invalid_settings(
                    "code column and identifier column must differ",
                ));
            }
            None if default_source.is_none() => {
                return Err(ImportError::invalid_settings(
                    "either a code column or a default source is required",
                ));
            }
            _ => {}
        }

        let samples: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(col, _)| *col != id_column && Some(*col) != code_column)
            .map(|(col, name)| (col, name.clone()))
            .collect();
        if samples.is_empty() {
            return Err(ImportError::invalid_settings("no sample columns"));
        }

        Ok(Self {
            width,
            id_column,
            code_column,
            samples,
        })
    }

    /// A sample is numeric iff every non-empty value seen parses as a number.
    fn sniff_types(&self, rows: &[&StringRecord]) -> Vec<ValueType> {
        self.samples
            .iter()
            .map(|(col, _)| {
                let all_numeric = rows
                    .iter()
                    .filter_map(|row| row.get(*col))
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .all(|value| value.parse::<f64>().is_ok());
                if all_numeric {
                    ValueType::Numeric
                } else {
                    ValueType::Text
                }
            })
            .collect()
    }
}

/// Line of a row in the input file. Needed because the reader skips blank lines.
fn physical_line(row: &Result<StringRecord, csv::Error>) -> Option<usize> {
    let position = match row {
        Ok(record) => record.position(),
        Err(err) => err.position(),
    };
    position.map(|pos| pos.line() as usize)
}

/// `Column 1`, `Column 2`, ... for files without a header row
fn synthetic_headers(width: usize) -> Vec<String> {
    (1..=width).map(|n| format!("Column {n}")).collect()
}

impl Importer<'_> {
    /// Import a delimited text file into a new dataset at `target`.
    pub fn import_delimited(&self, input: &Path, target: &Path) -> Result<ImportReport, ImportError> {
        let settings = self.settings();
        let mut reader = ReaderBuilder::new()
            .delimiter(settings.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(input)?;
        let mut records = reader.records();

        let first = records
            .next()
            .transpose()?
            .ok_or_else(|| ImportError::EmptyInput(input.to_path_buf()))?;

        let mut sniff_buffer = Vec::new();
        let headers = if settings.has_header {
            first.iter().map(str::to_string).collect()
        } else {
            let headers = synthetic_headers(first.len());
            sniff_buffer.push(Ok(first));
            headers
        };
        let layout = ColumnLayout::new(
            &headers,
            settings.id_column,
            settings.code_column,
            settings.default_source.as_ref(),
        )?;

        while sniff_buffer.len() < settings.type_sniff_rows {
            match records.next() {
                Some(record) => sniff_buffer.push(record),
                None => break,
            }
        }
        let readable: Vec<&StringRecord> =
            sniff_buffer.iter().filter_map(|r| r.as_ref().ok()).collect();
        let types = layout.sniff_types(&readable);

        info!(
            "Importing {} into {} ({} sample column(s))",
            input.display(),
            target.display(),
            layout.samples.len()
        );

        let first_line = if settings.has_header { 2 } else { 1 };
        let rows = sniff_buffer.into_iter().chain(records);

        let mut store = ExpressionStore::create(self.backend, target)?;
        let mut errors = ErrorLog::new(target);
        match self.load_rows(&mut store, &layout, &types, rows, first_line, &mut errors) {
            Ok(report) => self.finish(store, errors, report),
            Err(err) => {
                abandon(store);
                Err(err)
            }
        }
    }

    fn load_rows(
        &self,
        store: &mut ExpressionStore,
        layout: &ColumnLayout,
        types: &[ValueType],
        rows: impl Iterator<Item = Result<StringRecord, csv::Error>>,
        first_line: usize,
        errors: &mut ErrorLog,
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();

        for (sample_id, ((_, name), value_type)) in layout.samples.iter().zip(types).enumerate() {
            store.declare_sample(sample_id as i32, name, *value_type)?;
        }
        store.commit()?;
        report.samples_declared = layout.samples.len();

        let mut committer = BatchCommitter::new(self.settings().commit_every);
        for (row_index, row) in rows.enumerate() {
            if self.token.is_cancelled() {
                info!("Import cancelled after {} row(s)", report.rows_read);
                report.cancelled = true;
                break;
            }

            let line = physical_line(&row).unwrap_or(first_line + row_index);
            report.rows_read += 1;
            self.report_progress(report.rows_read);

            let record = match row {
                Ok(record) => record,
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => {
                    errors.record(line, &RowError::Unreadable(err.to_string()))?;
                    continue;
                }
            };

            match self.import_row(store, layout, &record, row_index as i64)? {
                Ok(inserted) => {
                    report.rows_added += 1;
                    report.expression_rows += inserted;
                    committer.inserted(store, inserted)?;
                }
                Err(row_error) => errors.record(line, &row_error)?,
            }
        }

        store.commit()?;
        Ok(report)
    }

    /// Resolve one row and append its values. The outer error is fatal,
    /// the inner one only skips the row.
    fn import_row(
        &self,
        store: &ExpressionStore,
        layout: &ColumnLayout,
        record: &StringRecord,
        group_id: i64,
    ) -> Result<Result<usize, RowError>, StorageError> {
        if record.len() != layout.width {
            return Ok(Err(RowError::ColumnCount {
                expected: layout.width,
                found: record.len(),
            }));
        }

        let id = record.get(layout.id_column).unwrap_or_default().trim();
        if id.is_empty() {
            return Ok(Err(RowError::EmptyIdentifier));
        }
        let code = layout
            .code_column
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|code| !code.is_empty());
        let source = match (code, &self.settings().default_source) {
            (Some(code), _) => DataSource::lookup(code),
            (None, Some(default)) => default.clone(),
            (None, None) => return Ok(Err(RowError::MissingCode(id.to_string()))),
        };
        let reporter = Xref::new(id, source);

        let hubs = self.mapper.resolve_to_hub(&reporter)?;
        if hubs.is_empty() {
            return Ok(Err(RowError::Unmapped(reporter)));
        }

        // A row lands whole or not at all
        store.begin_row()?;
        let mut inserted = 0;
        for hub in &hubs {
            for (sample_id, (col, _)) in layout.samples.iter().enumerate() {
                let raw = record.get(*col).unwrap_or_default();
                if let Err(err) =
                    store.append_expression(&reporter, hub, sample_id as i32, raw, group_id)
                {
                    store.discard_row()?;
                    return Ok(Err(RowError::Insert(err.to_string())));
                }
                inserted += 1;
            }
        }
        store.keep_row()?;
        Ok(Ok(inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::expression::SampleValue;
    use crate::import::{error_file_path, ImportSettings};
    use crate::mapper::LinkIndex;
    use crate::storage::SqliteBackend;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    fn mapper() -> LinkIndex {
        let mut index = LinkIndex::new();
        index.add("ENSG1", Xref::new("GENE1", "L"));
        index.add("ENSG2", Xref::new("GENE2", "L"));
        index.add("ENSG3", Xref::new("GENE2", "L"));
        index
    }

    fn entrez_settings() -> ImportSettings {
        ImportSettings {
            default_source: Some(DataSource::entrez()),
            ..ImportSettings::default()
        }
    }

    #[test]
    fn test_import_tab_file() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("data.txt");
        fs::write(
            &input,
            "id\tcontrol\tcall\nGENE1\t1.5\tup\nGENE2\t2\tdown\nGENE_UNKNOWN\t3\tflat\n",
        )
        .unwrap();
        let target = temp.path().join("data.pgex");

        let index = mapper();
        let report = Importer::new(&index, &SqliteBackend)
            .with_settings(entrez_settings())
            .import_delimited(&input, &target)
            .unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_added, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.samples_declared, 2);
        // GENE1: 1 hub x 2 samples, GENE2: 2 hubs x 2 samples
        assert_eq!(report.expression_rows, 6);
        assert_eq!(report.error_file, Some(error_file_path(&target)));
        assert_eq!(report.database, Some(target.clone()));

        let log = fs::read_to_string(error_file_path(&target)).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.starts_with("Line 4:"));
        assert!(log.contains("L:GENE_UNKNOWN"));

        let store = ExpressionStore::open(&SqliteBackend, &target).unwrap();
        let samples = store.samples();
        assert_eq!(samples.value_type(0), Some(ValueType::Numeric));
        assert_eq!(samples.value_type(1), Some(ValueType::Text));
        assert_eq!(samples.get(0).unwrap().name, "control");

        let records = store.records_by_hub("ENSG3").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].group_id(), 1);
        assert_eq!(records[0].sample_data(0), Some(&SampleValue::Numeric(2.0)));
    }

    #[test]
    fn test_error_file_removed_when_clean() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("data.csv");
        fs::write(&input, "GENE1,L,4\n").unwrap();
        let target = temp.path().join("clean.pgex");
        fs::write(error_file_path(&target), "stale").unwrap();

        let index = mapper();
        let settings = ImportSettings {
            delimiter: b',',
            has_header: false,
            code_column: Some(1),
            ..ImportSettings::default()
        };
        let report = Importer::new(&index, &SqliteBackend)
            .with_settings(settings)
            .import_delimited(&input, &target)
            .unwrap();

        assert_eq!(report.errors, 0);
        assert_eq!(report.error_file, None);
        assert!(!error_file_path(&target).exists());

        let store = ExpressionStore::open(&SqliteBackend, &target).unwrap();
        assert_eq!(store.samples().get(0).unwrap().name, "Column 3");
    }

    #[test]
    fn test_row_errors_are_isolated() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("data.txt");
        fs::write(
            &input,
            "id\tcode\ts1\n\tL\t1\nGENE1\tL\nGENE2\t\t5\nGENE1\tEntrez Gene\t2\n",
        )
        .unwrap();
        let target = temp.path().join("data.pgex");

        let index = mapper();
        let settings = ImportSettings {
            code_column: Some(1),
            ..ImportSettings::default()
        };
        let report = Importer::new(&index, &SqliteBackend)
            .with_settings(settings)
            .import_delimited(&input, &target)
            .unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_added, 1);
        assert_eq!(report.errors, 3);

        let log = fs::read_to_string(error_file_path(&target)).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("empty identifier"));
        assert!(lines[1].contains("expected 3 columns, found 2"));
        assert!(lines[2].contains("no system code"));
    }

    #[test]
    fn test_error_lines_count_blank_lines() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("gaps.txt");
        fs::write(&input, "id\ts1\nGENE1\t1\n\nGENE_UNKNOWN\t2\n").unwrap();
        let target = temp.path().join("gaps.pgex");

        let index = mapper();
        let report = Importer::new(&index, &SqliteBackend)
            .with_settings(entrez_settings())
            .import_delimited(&input, &target)
            .unwrap();

        assert_eq!(report.rows_read, 2);
        assert_eq!(report.errors, 1);
        let log = fs::read_to_string(error_file_path(&target)).unwrap();
        assert!(log.starts_with("Line 4:"), "unexpected log: {log}");
    }

    #[test]
    fn test_failed_insert_leaves_no_partial_row() {
        let mut store = ExpressionStore::in_memory().unwrap();
        store.declare_sample(0, "s1", ValueType::Text).unwrap();
        store.declare_sample(1, "s2", ValueType::Text).unwrap();
        store
            .execute_sql(
                "CREATE TRIGGER reject_value BEFORE INSERT ON expression
                 WHEN NEW.data = 'reject'
                 BEGIN SELECT RAISE(ABORT, 'value rejected'); END;",
            )
            .unwrap();

        let headers = vec!["id".to_string(), "s1".to_string(), "s2".to_string()];
        let layout = ColumnLayout::new(&headers, 0, None, Some(&DataSource::entrez())).unwrap();
        let index = mapper();
        let importer = Importer::new(&index, &SqliteBackend).with_settings(entrez_settings());

        // GENE2 maps to two hubs: the first hub's s1 value goes in before s2 fails
        let bad = StringRecord::from(vec!["GENE2", "1", "reject"]);
        let result = importer.import_row(&store, &layout, &bad, 0).unwrap();
        assert!(matches!(result, Err(RowError::Insert(_))));
        assert_eq!(store.row_count().unwrap(), 0);

        let good = StringRecord::from(vec!["GENE1", "1", "2"]);
        let result = importer.import_row(&store, &layout, &good, 1).unwrap();
        assert_eq!(result, Ok(2));
        store.commit().unwrap();
        assert_eq!(store.row_count().unwrap(), 2);
        assert!(store.query_by_hub("ENSG2").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("data.txt");
        fs::write(&input, "id\ts1\nGENE1\t1\n").unwrap();
        let index = mapper();

        let no_source = Importer::new(&index, &SqliteBackend)
            .import_delimited(&input, &temp.path().join("a.pgex"));
        assert!(matches!(no_source, Err(ImportError::InvalidSettings(_))));

        let bad_column = Importer::new(&index, &SqliteBackend)
            .with_settings(ImportSettings {
                id_column: 5,
                ..entrez_settings()
            })
            .import_delimited(&input, &temp.path().join("b.pgex"));
        assert!(matches!(bad_column, Err(ImportError::InvalidSettings(_))));
    }

    #[test]
    fn test_empty_input() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("empty.txt");
        fs::write(&input, "").unwrap();
        let index = mapper();

        let result = Importer::new(&index, &SqliteBackend)
            .with_settings(entrez_settings())
            .import_delimited(&input, &temp.path().join("e.pgex"));
        assert!(matches!(result, Err(ImportError::EmptyInput(_))));
    }

    #[test]
    fn test_cancelled_import_is_committed_not_finalized() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("data.txt");
        fs::write(&input, "id\ts1\nGENE1\t1\nGENE2\t2\nGENE1\t3\n").unwrap();
        let target = temp.path().join("data.pgex");

        let index = mapper();
        let token = CancellationToken::new();
        let seen = Cell::new(0);
        let report = Importer::new(&index, &SqliteBackend)
            .with_settings(entrez_settings())
            .with_token(token.clone())
            .on_progress(|rows| {
                seen.set(rows);
                if rows == 2 {
                    token.cancel();
                }
            })
            .import_delimited(&input, &target)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.rows_read, 2);
        assert_eq!(report.database, None);
        assert_eq!(seen.get(), 2);

        // Committed rows are readable
        let store = ExpressionStore::open(&SqliteBackend, &target).unwrap();
        assert_eq!(store.row_count().unwrap(), 3);
    }

    #[test]
    fn test_commit_batches() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("data.txt");
        let mut content = String::from("id\ts1\n");
        for i in 0..25 {
            content.push_str(&format!("GENE1\t{i}\n"));
        }
        fs::write(&input, content).unwrap();
        let target = temp.path().join("data.pgex");

        let index = mapper();
        let report = Importer::new(&index, &SqliteBackend)
            .with_settings(ImportSettings {
                commit_every: 10,
                type_sniff_rows: 3,
                ..entrez_settings()
            })
            .import_delimited(&input, &target)
            .unwrap();

        assert_eq!(report.rows_added, 25);
        let store = ExpressionStore::open(&SqliteBackend, &target).unwrap();
        assert_eq!(store.row_count().unwrap(), 25);
    }
}
