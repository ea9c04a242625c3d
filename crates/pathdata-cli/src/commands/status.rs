//! Status command - Describe an identifier graph or expression dataset

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use pathdata_core::{ExpressionStore, OpenMode, Sample};
use serde::Serialize;

use super::{CommandContext, OutputFormat};

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Database to inspect
    database: PathBuf,

    /// Number of hub ids to list for datasets
    #[arg(long, default_value = "0")]
    hubs: usize,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFormat,
}

/// What kind of database a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseKind {
    IdentifierGraph,
    Expression,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    path: PathBuf,
    kind: DatabaseKind,
    backend: String,
    schema_version: i64,
    legacy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datanodes: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    samples: Vec<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expression_rows: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hub_ids: Vec<String>,
}

/// Execute the status command
pub fn execute(args: StatusArgs, ctx: &CommandContext) -> Result<()> {
    let path = ctx.database_path(&args.database);
    let kind = detect_kind(ctx, &path)?;

    let report = match kind {
        DatabaseKind::IdentifierGraph => {
            let gdb = ctx.open_gdb(&path)?;
            StatusReport {
                path: path.clone(),
                kind,
                backend: ctx.backend.kind().to_string(),
                schema_version: gdb.schema_version(),
                legacy: gdb.is_legacy(),
                links: Some(gdb.link_count()?),
                datanodes: Some(gdb.datanode_count()?),
                samples: Vec::new(),
                expression_rows: None,
                hub_ids: Vec::new(),
            }
        }
        DatabaseKind::Expression => {
            let gex = ExpressionStore::open(ctx.backend.as_ref(), &path)
                .with_context(|| format!("Failed to open dataset {}", path.display()))?;
            StatusReport {
                path: path.clone(),
                kind,
                backend: ctx.backend.kind().to_string(),
                schema_version: gex.schema_version(),
                legacy: false,
                links: None,
                datanodes: None,
                samples: gex.samples().iter().cloned().collect(),
                expression_rows: Some(gex.row_count()?),
                hub_ids: gex.hub_ids(args.hubs)?,
            }
        }
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

/// Look at the tables to tell graphs from datasets.
fn detect_kind(ctx: &CommandContext, path: &Path) -> Result<DatabaseKind> {
    let conn = ctx
        .backend
        .open(path, OpenMode::Read)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let kind = if conn.has_table("link")? {
        DatabaseKind::IdentifierGraph
    } else if conn.has_table("expression")? {
        DatabaseKind::Expression
    } else {
        bail!(
            "{} is neither an identifier graph nor an expression dataset",
            path.display()
        );
    };
    conn.close()?;
    Ok(kind)
}

fn print_report(report: &StatusReport) {
    let kind = match report.kind {
        DatabaseKind::IdentifierGraph => "identifier graph",
        DatabaseKind::Expression => "expression dataset",
    };
    println!("Database:     {}", report.path.display());
    println!("Kind:         {}", kind);
    println!("Backend:      {}", report.backend);
    println!(
        "Schema:       v{}{}",
        report.schema_version,
        if report.legacy { " (legacy)" } else { "" }
    );
    if let Some(links) = report.links {
        println!("Links:        {}", links);
    }
    if let Some(datanodes) = report.datanodes {
        println!("Datanodes:    {}", datanodes);
    }
    if let Some(rows) = report.expression_rows {
        println!("Values:       {}", rows);
        println!("Samples:      {}", report.samples.len());
        for sample in &report.samples {
            println!("  {:>3}  {:<7}  {}", sample.id, format!("{:?}", sample.value_type), sample.name);
        }
    }
    if !report.hub_ids.is_empty() {
        println!("Hubs:         {}", report.hub_ids.join(", "));
    }
}
