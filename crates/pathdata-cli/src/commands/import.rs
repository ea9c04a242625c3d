//! Import command - Load a delimited text file into a new dataset

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pathdata_config::ImportConfig;
use pathdata_core::{DataSource, ImportSettings, Importer};

use super::{print_report, CommandContext, OutputFormat};
use crate::progress::Feedback;

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Identifier graph used to map reporters to hubs
    gdb: PathBuf,

    /// Delimited text file to import
    input: PathBuf,

    /// Dataset to create (replaced if it exists)
    output: PathBuf,

    /// 0-based column holding reporter identifiers
    #[arg(long, default_value = "0")]
    id_column: usize,

    /// 0-based column holding system codes
    #[arg(long)]
    code_column: Option<usize>,

    /// System code for rows without one (overrides `import.default_source`)
    #[arg(long, short = 's')]
    source: Option<String>,

    /// Field separator (overrides `import.delimiter`)
    #[arg(long, short = 'd')]
    delimiter: Option<String>,

    /// The first row is data, not column names
    #[arg(long)]
    no_header: bool,

    /// Output format for the report
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output_format: OutputFormat,
}

impl ImportArgs {
    /// Merge flags over the configured import defaults.
    fn settings(&self, defaults: &ImportConfig) -> Result<ImportSettings> {
        let mut config = defaults.clone();
        if let Some(ref delimiter) = self.delimiter {
            config.delimiter = delimiter.replace("\\t", "\t");
        }
        if let Some(ref source) = self.source {
            config.default_source = Some(source.clone());
        }
        config.validate()?;

        Ok(ImportSettings {
            delimiter: config.delimiter_byte()?,
            has_header: config.has_header && !self.no_header,
            id_column: self.id_column,
            code_column: self.code_column,
            default_source: config.default_source.as_deref().map(DataSource::lookup),
            commit_every: config.commit_every,
            type_sniff_rows: config.type_sniff_rows,
        })
    }
}

/// Execute the import command
pub fn execute(args: ImportArgs, ctx: &CommandContext) -> Result<()> {
    let settings = args.settings(&ctx.config.import)?;
    let gdb = ctx.open_gdb(&args.gdb)?;
    let output = ctx.prepare_output(&args.output)?;

    let feedback = Feedback::spinner("Importing...", ctx.quiet);
    let report = Importer::new(&gdb, ctx.backend.as_ref())
        .with_settings(settings)
        .on_progress(|rows| {
            if rows % 500 == 0 {
                feedback.set_message(format!("Imported {} rows...", rows));
            }
        })
        .import_delimited(&args.input, &output)
        .with_context(|| format!("Failed to import {}", args.input.display()));

    let report = match report {
        Ok(report) => report,
        Err(err) => {
            feedback.fail("Import failed");
            return Err(err);
        }
    };

    if report.errors > 0 {
        feedback.warn(&format!("Imported with {} skipped row(s)", report.errors));
    } else {
        feedback.success("Import complete");
    }
    print_report(&report, args.output_format)
}
