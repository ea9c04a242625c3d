//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.pathdata/config.toml`
//! 2. Local config: `.pathdata/config.toml` (in workspace)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{
    CachingConfig, ConfigOverrides, ImportConfig, LoggingConfig, PathdataConfig, StorageConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global and local configuration directory name.
const CONFIG_DIR: &str = ".pathdata";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.pathdata`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<PathdataConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.pathdata`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<PathdataConfig, ConfigError> {
        let mut config = PathdataConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a single explicit config file over the defaults.
    pub fn load_file(
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<PathdataConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let mut config = merge_configs(PathdataConfig::default(), load_config_file(path)?);
        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<PathdataConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<PathdataConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    pub fn save_local(
        &self,
        workspace_root: &Path,
        config: &PathdataConfig,
    ) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(workspace_root), config)
    }

    /// Create `~/.pathdata/config.toml` with defaults unless it exists.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        init_config_file(&global_dir.join(CONFIG_FILE_NAME))
    }

    /// Create `.pathdata/config.toml` in the workspace unless it exists.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_file(&self.local_config_path(workspace_root))
    }

    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn init_config_file(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        save_config_file(path, &PathdataConfig::default())?;
    }
    Ok(path.to_path_buf())
}

fn load_config_file(path: &Path) -> Result<PathdataConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

fn save_config_file(path: &Path, config: &PathdataConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// A field left at its default in `overlay` keeps the base value, so
/// partial files only change what they mention.
fn merge_configs(base: PathdataConfig, overlay: PathdataConfig) -> PathdataConfig {
    PathdataConfig {
        storage: merge_storage(base.storage, overlay.storage),
        import: merge_import(base.import, overlay.import),
        caching: merge_caching(base.caching, overlay.caching),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

/// Pick `overlay` unless it equals the default.
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

fn merge_storage(base: StorageConfig, overlay: StorageConfig) -> StorageConfig {
    let default = StorageConfig::default();
    StorageConfig {
        data_dir: pick(base.data_dir, overlay.data_dir, default.data_dir),
        backend: pick(base.backend, overlay.backend, default.backend),
    }
}

fn merge_import(base: ImportConfig, overlay: ImportConfig) -> ImportConfig {
    let default = ImportConfig::default();
    ImportConfig {
        delimiter: pick(base.delimiter, overlay.delimiter, default.delimiter),
        commit_every: pick(base.commit_every, overlay.commit_every, default.commit_every),
        type_sniff_rows: pick(
            base.type_sniff_rows,
            overlay.type_sniff_rows,
            default.type_sniff_rows,
        ),
        has_header: pick(base.has_header, overlay.has_header, default.has_header),
        default_source: overlay.default_source.or(base.default_source),
    }
}

fn merge_caching(base: CachingConfig, overlay: CachingConfig) -> CachingConfig {
    CachingConfig {
        hub_memo_capacity: pick(
            base.hub_memo_capacity,
            overlay.hub_memo_capacity,
            CachingConfig::default().hub_memo_capacity,
        ),
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    let default = LoggingConfig::default();
    LoggingConfig {
        level: pick(base.level, overlay.level, default.level),
        format: pick(base.format, overlay.format, default.format),
        file: overlay.file.or(base.file),
    }
}
