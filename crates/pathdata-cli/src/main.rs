//! Pathdata CLI - Identifier mapping and expression data caching
//!
//! A command-line interface for building identifier graphs, importing
//! expression datasets and caching per-identifier data for pathway overlays.
//!
//! # Usage
//!
//! ```bash
//! # Build an identifier graph from a tab-separated link file
//! pathdata gdb build links.tsv human.pgdb
//!
//! # Import a tab-separated expression file
//! pathdata import human.pgdb expression.txt study.pgex --source L
//!
//! # Cache and average the data of a few identifiers
//! pathdata cache human.pgdb study.pgex L:1234 L:5678
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pathdata_config::{LogFormat, PathdataConfig, StorageBackendType};
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod progress;

/// Pathdata - Cross-reference resolution and expression data caching
#[derive(Parser, Debug)]
#[command(name = "pathdata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "PATHDATA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Database packaging (sqlite, archive)
    #[arg(long, global = true, env = "PATHDATA_BACKEND", value_parser = parse_backend)]
    backend: Option<StorageBackendType>,
}

fn parse_backend(s: &str) -> Result<StorageBackendType, String> {
    s.parse()
        .map_err(|e: pathdata_config::ConfigError| e.to_string())
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> pathdata_config::ConfigOverrides {
        pathdata_config::ConfigOverrides {
            backend: self.backend,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Identifier graph commands
    #[command(subcommand)]
    Gdb(commands::gdb::GdbCommand),

    /// List every identifier linked to an identifier
    Xref(commands::xref::XrefArgs),

    /// Suggest symbols or identifiers by prefix
    Suggest(commands::suggest::SuggestArgs),

    /// Free-text search over an identifier graph
    Search(commands::search::SearchArgs),

    /// Import a delimited text file into a new expression dataset
    Import(commands::import::ImportArgs),

    /// Convert a legacy expression dataset
    Convert(commands::convert::ConvertArgs),

    /// Cache and average expression data for identifiers
    Cache(commands::cache::CacheArgs),

    /// Show what a database contains
    Status(commands::status::StatusArgs),

    /// View and initialize configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(&cli.global)?;
    init_logging(&cli.global, &config)?;

    let ctx = commands::CommandContext::new(config, &cli.global)?;
    match cli.command {
        Commands::Gdb(cmd) => commands::gdb::execute(cmd, &ctx),
        Commands::Xref(args) => commands::xref::execute(args, &ctx),
        Commands::Suggest(args) => commands::suggest::execute(args, &ctx),
        Commands::Search(args) => commands::search::execute(args, &ctx),
        Commands::Import(args) => commands::import::execute(args, &ctx),
        Commands::Convert(args) => commands::convert::execute(args, &ctx),
        Commands::Cache(args) => commands::cache::execute(args, &ctx),
        Commands::Status(args) => commands::status::execute(args, &ctx),
        Commands::Config(cmd) => commands::config::execute(cmd, &ctx),
    }
}

/// Install the global subscriber; flags win over `logging.level`.
fn init_logging(global: &GlobalOptions, config: &PathdataConfig) -> Result<()> {
    let log_level = if global.quiet {
        Level::ERROR
    } else if global.verbose {
        Level::DEBUG
    } else {
        Level::from_str(&config.logging.level).unwrap_or(Level::INFO)
    };

    let (writer, ansi) = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(writer);
    match config.logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => {
            tracing::subscriber::set_global_default(builder.with_ansi(ansi).finish())?
        }
    }
    Ok(())
}
