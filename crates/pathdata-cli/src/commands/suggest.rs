//! Suggest command - Prefix completion for symbols and identifiers

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{CommandContext, OutputFormat};

/// Arguments for the suggest command
#[derive(Args, Debug)]
pub struct SuggestArgs {
    /// Identifier graph
    gdb: PathBuf,

    /// Prefix to complete
    prefix: String,

    /// Suggest identifiers instead of symbols
    #[arg(long)]
    ids: bool,

    /// Maximum number of suggestions
    #[arg(long, short = 'n', default_value = "10")]
    limit: usize,

    /// Match the prefix case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Execute the suggest command
pub fn execute(args: SuggestArgs, ctx: &CommandContext) -> Result<()> {
    let gdb = ctx.open_gdb(&args.gdb)?;

    let suggestions: Vec<String> = if args.ids {
        gdb.id_suggestions(&args.prefix, args.limit, args.case_sensitive)?
            .iter()
            .map(ToString::to_string)
            .collect()
    } else {
        gdb.symbol_suggestions(&args.prefix, args.limit, args.case_sensitive)?
    };

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&suggestions)?),
        OutputFormat::Text => {
            for suggestion in &suggestions {
                println!("{}", suggestion);
            }
        }
    }
    Ok(())
}
