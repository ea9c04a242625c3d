//! Search command - Free-text search over ids, backpages and attributes

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommandContext, OutputFormat};

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Identifier graph
    gdb: PathBuf,

    /// Text to look for (case-insensitive substring)
    text: String,

    /// Maximum number of results to return
    #[arg(long, short = 'n', default_value = "20")]
    limit: usize,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Execute the search command
pub fn execute(args: SearchArgs, ctx: &CommandContext) -> Result<()> {
    let gdb = ctx.open_gdb(&args.gdb)?;
    let hits = gdb
        .free_text_search(&args.text, args.limit)
        .context("Search failed")?;

    if hits.is_empty() {
        if !ctx.quiet {
            eprintln!("No results found for: {}", args.text);
        }
        return Ok(());
    }

    match args.output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&hits).context("Failed to serialize results")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for hit in &hits {
                match hit.symbol {
                    Some(ref symbol) => println!("{}\t{}", hit.xref, symbol),
                    None => println!("{}", hit.xref),
                }
            }
        }
    }
    Ok(())
}
