//! Pathdata Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.pathdata/config.toml`
//! - Local config: `.pathdata/config.toml` (in workspace)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Log levels accepted by `logging.level`
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration for Pathdata.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PathdataConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Delimited-text import configuration
    pub import: ImportConfig,

    /// Caching run configuration
    pub caching: CachingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where databases live and how they are packaged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory bare database names resolve against (default: `.`)
    pub data_dir: PathBuf,

    /// Database packaging
    pub backend: StorageBackendType,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            backend: StorageBackendType::default(),
        }
    }
}

/// Database packaging selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// Plain single-file SQLite database
    Sqlite,
    /// SQLite database packed into a zip archive (default)
    #[default]
    Archive,
}

impl std::fmt::Display for StorageBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

impl std::str::FromStr for StorageBackendType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "archive" | "zip" => Ok(Self::Archive),
            _ => Err(ConfigError::invalid_value(
                "storage.backend",
                format!("unknown backend '{}'. Valid values: sqlite, archive", s),
            )),
        }
    }
}

/// Delimited-text import defaults.
///
/// # Example TOML
///
/// ```toml
/// [import]
/// delimiter = ","
/// commit_every = 5000
/// default_source = "L"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Field separator; a single ASCII character
    pub delimiter: String,

    /// Values inserted between commits
    pub commit_every: usize,

    /// Rows inspected to decide whether a sample column is numeric
    pub type_sniff_rows: usize,

    /// First row names the columns
    pub has_header: bool,

    /// System code used when a row carries none
    pub default_source: Option<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            delimiter: "\t".to_string(),
            commit_every: 1000,
            type_sniff_rows: 100,
            has_header: true,
            default_source: None,
        }
    }
}

impl ImportConfig {
    /// The delimiter as the single byte the reader expects.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        match self.delimiter.as_bytes() {
            [byte] if *byte != b'\n' && *byte != b'\r' => Ok(*byte),
            _ => Err(ConfigError::invalid_value(
                "import.delimiter",
                format!(
                    "'{}' is not a single non-newline ASCII character",
                    self.delimiter.escape_default()
                ),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delimiter_byte()?;
        if self.commit_every == 0 {
            return Err(ConfigError::invalid_value(
                "import.commit_every",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Caching run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CachingConfig {
    /// Hub resolutions memoized per run
    pub hub_memo_capacity: usize,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            hub_memo_capacity: 4096,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            Ok(())
        } else {
            Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "unknown level '{}'. Valid values: {}",
                    self.level,
                    LOG_LEVELS.join(", ")
                ),
            ))
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override data directory
    pub data_dir: Option<PathBuf>,

    /// Override storage backend
    pub backend: Option<StorageBackendType>,

    /// Override import delimiter
    pub delimiter: Option<String>,

    /// Override default system code
    pub default_source: Option<String>,

    /// Override log level
    pub log_level: Option<String>,

    /// Override log format
    pub log_format: Option<LogFormat>,
}

impl PathdataConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.data_dir {
            self.storage.data_dir = dir.clone();
        }

        if let Some(backend) = overrides.backend {
            self.storage.backend = backend;
        }

        if let Some(ref delimiter) = overrides.delimiter {
            self.import.delimiter = delimiter.clone();
        }

        if let Some(ref source) = overrides.default_source {
            self.import.default_source = Some(source.clone());
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }

        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.import.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Get the effective data directory for a workspace.
    pub fn data_dir(&self, workspace_root: &Path) -> PathBuf {
        if self.storage.data_dir.is_absolute() {
            self.storage.data_dir.clone()
        } else {
            workspace_root.join(&self.storage.data_dir)
        }
    }

    /// Resolve a database name against the data directory.
    ///
    /// Names that already carry a directory component are used as given.
    pub fn database_path(&self, workspace_root: &Path, name: &Path) -> PathBuf {
        let bare = name.parent().is_none_or(|p| p.as_os_str().is_empty());
        if name.is_absolute() || !bare {
            name.to_path_buf()
        } else {
            self.data_dir(workspace_root).join(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = PathdataConfig::default();
        assert_eq!(config.storage.data_dir, PathBuf::from("."));
        assert_eq!(config.storage.backend, StorageBackendType::Archive);
        assert_eq!(config.import.delimiter, "\t");
        assert_eq!(config.import.commit_every, 1000);
        assert_eq!(config.import.type_sniff_rows, 100);
        assert!(config.import.has_header);
        assert_eq!(config.caching.hub_memo_capacity, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = PathdataConfig::default();
        let overrides = ConfigOverrides {
            data_dir: Some(PathBuf::from("/custom/data")),
            backend: Some(StorageBackendType::Sqlite),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.storage.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.storage.backend, StorageBackendType::Sqlite);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_data_dir_resolution() {
        let mut config = PathdataConfig::default();
        let workspace = PathBuf::from("/home/user/project");
        assert_eq!(config.data_dir(&workspace), workspace);

        config.storage.data_dir = PathBuf::from("data");
        assert_eq!(
            config.data_dir(&workspace),
            PathBuf::from("/home/user/project/data")
        );

        let mut config = PathdataConfig::default();
        config.storage.data_dir = PathBuf::from("/absolute/data");
        assert_eq!(config.data_dir(&workspace), PathBuf::from("/absolute/data"));
    }

    #[test]
    fn test_database_path() {
        let mut config = PathdataConfig::default();
        config.storage.data_dir = PathBuf::from("dbs");
        let workspace = Path::new("/project");

        assert_eq!(
            config.database_path(workspace, Path::new("human.pgdb")),
            PathBuf::from("/project/dbs/human.pgdb")
        );
        assert_eq!(
            config.database_path(workspace, Path::new("data/human.pgdb")),
            PathBuf::from("data/human.pgdb")
        );
        assert_eq!(
            config.database_path(workspace, Path::new("/abs/human.pgdb")),
            PathBuf::from("/abs/human.pgdb")
        );
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!(
            "sqlite".parse::<StorageBackendType>().unwrap(),
            StorageBackendType::Sqlite
        );
        assert_eq!(
            "ZIP".parse::<StorageBackendType>().unwrap(),
            StorageBackendType::Archive
        );
        assert!("postgres".parse::<StorageBackendType>().is_err());
        assert_eq!(StorageBackendType::Archive.to_string(), "archive");
    }

    #[test]
    fn test_delimiter_validation() {
        let mut import = ImportConfig::default();
        assert_eq!(import.delimiter_byte().unwrap(), b'\t');

        import.delimiter = ",".to_string();
        assert_eq!(import.delimiter_byte().unwrap(), b',');

        for bad in ["", "\n", ";;", "é"] {
            import.delimiter = bad.to_string();
            assert!(import.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_commit_every_zero_rejected() {
        let mut config = PathdataConfig::default();
        config.import.commit_every = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("commit_every"));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let mut config = PathdataConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = PathdataConfig::default();
        config.import.default_source = Some("L".to_string());
        config.logging.format = LogFormat::Json;

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PathdataConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed, config);
    }
}
