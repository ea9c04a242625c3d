//! Gdb command - Build identifier graphs from link files
//!
//! Link files are tab-separated, one link per line:
//!
//! ```text
//! hub-id  hub-code  leaf-id  leaf-code  [backpage]  [symbol]
//! ```
//!
//! Lines starting with `#` are ignored. Backpage and symbol are attached to
//! the hub the first time they appear.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use pathdata_core::{IdentifierGraphStore, Xref, SYMBOL_ATTRIBUTE};
use tracing::{info, warn};

use super::{print_info, CommandContext};
use crate::progress::Feedback;

/// Identifier graph commands
#[derive(Subcommand, Debug)]
pub enum GdbCommand {
    /// Build a new identifier graph from a link file
    Build(BuildArgs),
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Tab-separated link file
    links: PathBuf,

    /// Database to create (replaced if it exists)
    output: PathBuf,
}

/// Execute a gdb command
pub fn execute(cmd: GdbCommand, ctx: &CommandContext) -> Result<()> {
    match cmd {
        GdbCommand::Build(args) => execute_build(args, ctx),
    }
}

#[derive(Debug, Default)]
struct BuildStats {
    lines: usize,
    links: usize,
    duplicates: usize,
    skipped: usize,
    hubs: usize,
}

fn execute_build(args: BuildArgs, ctx: &CommandContext) -> Result<()> {
    let output = ctx.prepare_output(&args.output)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(&args.links)
        .with_context(|| format!("Failed to open link file {}", args.links.display()))?;

    let gdb = IdentifierGraphStore::create(ctx.backend.as_ref(), &output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let feedback = Feedback::spinner("Loading links...", ctx.quiet);
    let mut stats = BuildStats::default();
    let mut described: HashSet<Xref> = HashSet::new();

    for record in reader.records() {
        let record = record.context("Failed to read link file")?;
        stats.lines += 1;

        let field = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty());
        let (Some(hub_id), Some(hub_code), Some(leaf_id), Some(leaf_code)) =
            (field(0), field(1), field(2), field(3))
        else {
            warn!("Skipping malformed link on line {}", stats.lines);
            stats.skipped += 1;
            continue;
        };

        let hub = Xref::new(hub_id, hub_code);
        let leaf = Xref::new(leaf_id, leaf_code);
        if gdb.add_link(&hub, &leaf, None)? {
            stats.links += 1;
        } else {
            stats.duplicates += 1;
        }

        if described.insert(hub.clone()) {
            stats.hubs += 1;
            gdb.add_datanode(&hub, field(4))?;
            if let Some(symbol) = field(5) {
                gdb.add_attribute(&hub, SYMBOL_ATTRIBUTE, symbol)?;
            }
        }

        if stats.lines % 10_000 == 0 {
            gdb.commit()?;
            feedback.set_message(format!("Loaded {} links...", stats.links));
        }
    }

    let path = gdb
        .finalize(ctx.backend.as_ref())
        .with_context(|| format!("Failed to finalize {}", output.display()))?;
    info!(
        "Built {} with {} links across {} hubs",
        path.display(),
        stats.links,
        stats.hubs
    );

    let summary = format!(
        "Built {} ({} links, {} hubs)",
        path.display(),
        stats.links,
        stats.hubs
    );
    if stats.skipped > 0 {
        feedback.warn(&format!(
            "{summary}; skipped {} malformed line(s)",
            stats.skipped
        ));
    } else {
        feedback.success(&summary);
    }
    if stats.duplicates > 0 {
        print_info(
            &format!("{} duplicate link(s) ignored", stats.duplicates),
            ctx.quiet,
        );
    }
    Ok(())
}
