//! Xref command - Cross-reference an identifier through its hubs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pathdata_core::{DataSource, IdMapper, Xref};
use serde_json::json;

use super::{CommandContext, OutputFormat};

/// Arguments for the xref command
#[derive(Args, Debug)]
pub struct XrefArgs {
    /// Identifier graph
    gdb: PathBuf,

    /// Identifier as `code:id` (e.g. `L:1234`)
    xref: Xref,

    /// Only list identifiers of this system (code or full name)
    #[arg(long, short = 's')]
    source: Option<String>,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Execute the xref command
pub fn execute(args: XrefArgs, ctx: &CommandContext) -> Result<()> {
    let gdb = ctx.open_gdb(&args.gdb)?;
    let filter = args.source.as_deref().map(DataSource::lookup);

    let refs = gdb
        .cross_references(&args.xref, filter.as_ref())
        .with_context(|| format!("Failed to cross-reference {}", args.xref))?;

    match args.output {
        OutputFormat::Json => {
            let entries: Vec<_> = refs
                .iter()
                .map(|x| {
                    json!({
                        "id": x.id(),
                        "code": x.code(),
                        "source": x.source().full_name(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if refs.is_empty() && !ctx.quiet {
                eprintln!("No cross-references found for {}", args.xref);
            }
            for x in &refs {
                match x.source().full_name() {
                    Some(name) => println!("{}\t{}", x, name),
                    None => println!("{}", x),
                }
            }
        }
    }
    Ok(())
}
