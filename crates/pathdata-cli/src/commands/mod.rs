//! CLI command implementations

pub mod cache;
pub mod config;
pub mod convert;
pub mod gdb;
pub mod import;
pub mod search;
pub mod status;
pub mod suggest;
pub mod xref;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use pathdata_config::{ConfigLoader, PathdataConfig, StorageBackendType};
use pathdata_core::{BackendKind, IdentifierGraphStore, ImportReport, StorageBackend};

use crate::GlobalOptions;

/// Output format shared by commands that print results
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

/// Everything a command needs once options and config are resolved
pub struct CommandContext {
    pub config: PathdataConfig,
    pub backend: Arc<dyn StorageBackend>,
    pub workspace: PathBuf,
    pub quiet: bool,
    /// Explicit `--config` file, if any
    pub config_file: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(config: PathdataConfig, global: &GlobalOptions) -> Result<Self> {
        let workspace = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self {
            backend: backend_kind(config.storage.backend).create(),
            config,
            workspace,
            quiet: global.quiet,
            config_file: global.config.clone(),
        })
    }

    /// Resolve a database name against `storage.data_dir`.
    pub fn database_path(&self, name: &Path) -> PathBuf {
        self.config.database_path(&self.workspace, name)
    }

    /// Open an identifier graph for queries.
    pub fn open_gdb(&self, name: &Path) -> Result<IdentifierGraphStore> {
        let path = self.database_path(name);
        IdentifierGraphStore::open(self.backend.as_ref(), &path)
            .with_context(|| format!("Failed to open identifier graph {}", path.display()))
    }

    /// Make sure the parent of a database about to be written exists.
    pub fn prepare_output(&self, name: &Path) -> Result<PathBuf> {
        let path = self.database_path(name);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(path)
    }
}

pub fn backend_kind(backend: StorageBackendType) -> BackendKind {
    match backend {
        StorageBackendType::Sqlite => BackendKind::Sqlite,
        StorageBackendType::Archive => BackendKind::Archive,
    }
}

/// Load configuration with optional config file override.
pub fn load_config(global: &GlobalOptions) -> Result<PathdataConfig> {
    let overrides = global.to_config_overrides();

    if let Some(ref config_path) = global.config {
        return ConfigLoader::load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    let workspace = std::env::current_dir().context("Failed to get current directory")?;
    ConfigLoader::new()
        .load(&workspace, Some(&overrides))
        .context("Failed to load configuration")
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}

/// Print an import or conversion report.
pub fn print_report(report: &ImportReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("Rows read:        {}", report.rows_read);
            println!("Rows added:       {}", report.rows_added);
            println!("Samples:          {}", report.samples_declared);
            println!("Values written:   {}", report.expression_rows);
            if let Some(ref file) = report.error_file {
                println!("Rows skipped:     {} (see {})", report.errors, file.display());
            }
            match (&report.database, report.cancelled) {
                (_, true) => println!("Cancelled; dataset left unfinalized"),
                (Some(db), false) => println!("Dataset:          {}", db.display()),
                (None, false) => {}
            }
        }
    }
    Ok(())
}
