//! Convert command - Rebuild a legacy dataset with hub ids

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pathdata_core::{DataSource, ImportSettings, Importer};

use super::{print_report, CommandContext, OutputFormat};
use crate::progress::Feedback;

/// Arguments for the convert command
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Identifier graph used to map reporters to hubs
    gdb: PathBuf,

    /// Legacy single-file dataset
    legacy: PathBuf,

    /// Dataset to create (replaced if it exists)
    output: PathBuf,

    /// Output format for the report
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output_format: OutputFormat,
}

/// Execute the convert command
pub fn execute(args: ConvertArgs, ctx: &CommandContext) -> Result<()> {
    let gdb = ctx.open_gdb(&args.gdb)?;
    let output = ctx.prepare_output(&args.output)?;
    let settings = ImportSettings {
        commit_every: ctx.config.import.commit_every,
        default_source: ctx
            .config
            .import
            .default_source
            .as_deref()
            .map(DataSource::lookup),
        ..ImportSettings::default()
    };

    let feedback = Feedback::spinner("Converting...", ctx.quiet);
    let report = Importer::new(&gdb, ctx.backend.as_ref())
        .with_settings(settings)
        .on_progress(|reporters| {
            feedback.set_message(format!("Converted {} reporters...", reporters));
        })
        .convert_legacy(&ctx.database_path(&args.legacy), &output)
        .with_context(|| format!("Failed to convert {}", args.legacy.display()));

    match report {
        Ok(report) => {
            feedback.success("Conversion complete");
            print_report(&report, args.output_format)
        }
        Err(err) => {
            feedback.fail("Conversion failed");
            Err(err)
        }
    }
}
