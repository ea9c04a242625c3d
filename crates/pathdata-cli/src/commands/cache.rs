//! Cache command - Run the caching pipeline and print averaged values

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use pathdata_core::{CachedData, CachingEvent, RunState, SampleValue, Session, Xref};
use serde_json::json;

use super::{print_info, CommandContext, OutputFormat};
use crate::progress::Feedback;

/// Arguments for the cache command
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Identifier graph
    gdb: PathBuf,

    /// Expression dataset
    gex: PathBuf,

    /// Identifiers as `code:id`
    #[arg(required = true, num_args = 1..)]
    identifiers: Vec<Xref>,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Execute the cache command
pub fn execute(args: CacheArgs, ctx: &CommandContext) -> Result<()> {
    let session = Session::new(Arc::clone(&ctx.backend))
        .with_memo_capacity(ctx.config.caching.hub_memo_capacity);
    let gdb = ctx.database_path(&args.gdb);
    let gex = ctx.database_path(&args.gex);
    session
        .connect_gdb(&gdb)
        .with_context(|| format!("Failed to open identifier graph {}", gdb.display()))?;
    session
        .connect_gex(&gex)
        .with_context(|| format!("Failed to open dataset {}", gex.display()))?;

    let total = args.identifiers.len() as u64;
    let handle = session
        .start_caching(args.identifiers.clone())
        .context("Failed to start caching run")?;

    let feedback = Feedback::counter(total, "Caching", ctx.quiet);
    for event in handle.events().iter() {
        match event {
            CachingEvent::Progress { processed, .. } => feedback.set_position(processed as u64),
            CachingEvent::Finished(_) => break,
        }
    }
    feedback.clear();

    let summary = handle.wait().context("Caching run failed")?;
    if let RunState::Failed(ref reason) = summary.state {
        bail!("Caching run failed: {}", reason);
    }
    print_info(
        &format!(
            "Cached {} of {} identifier(s) ({} unmapped, {} resolution failure(s))",
            summary.with_data, summary.total, summary.unmapped, summary.resolution_failures
        ),
        ctx.quiet,
    );

    let cache = session.cached_data();
    match args.output {
        OutputFormat::Json => {
            let identifiers: Vec<_> = args
                .identifiers
                .iter()
                .map(|xref| {
                    json!({
                        "xref": xref.to_string(),
                        "records": cache.get(xref).map_or(0, |r| r.len()),
                        "average": named_average(&cache, xref),
                    })
                })
                .collect();
            let out = json!({ "summary": summary, "identifiers": identifiers });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => print_table(&cache, &args.identifiers),
    }
    session.close().context("Failed to close databases")?;
    Ok(())
}

/// Averages keyed by sample name
fn named_average(cache: &CachedData, xref: &Xref) -> Option<BTreeMap<String, SampleValue>> {
    let average = cache.average(xref)?;
    let samples = cache.samples();
    Some(
        average
            .into_iter()
            .map(|(id, value)| {
                let name = samples
                    .get(id)
                    .map_or_else(|| format!("sample {id}"), |s| s.name.clone());
                (name, value)
            })
            .collect(),
    )
}

fn print_table(cache: &CachedData, identifiers: &[Xref]) {
    let samples: Vec<_> = cache.samples().iter().collect();
    let header: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
    println!("identifier\trecords\t{}", header.join("\t"));

    for xref in identifiers {
        let records = cache.get(xref).map_or(0, |r| r.len());
        let cells: Vec<String> = match cache.average(xref) {
            Some(average) => samples
                .iter()
                .map(|s| average.get(&s.id).map_or_else(String::new, ToString::to_string))
                .collect(),
            None => samples.iter().map(|_| "-".to_string()).collect(),
        };
        println!("{}\t{}\t{}", xref, records, cells.join("\t"));
    }
}
