//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::catalog::StaticCatalog;
use crate::storage::{StorageConfiguration, StorageMode, TimePeriod};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub validity: ValidityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage tier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_cache_size_limit_mb")]
    pub cache_size_limit_mb: u64,

    /// Cached data older than this expires; 0 keeps it until evicted
    #[serde(default = "default_max_cache_age_minutes")]
    pub max_cache_age_minutes: u64,

    /// Retention bounds, e.g. "-2y" and "now"
    pub archive_retention_start: Option<String>,
    pub archive_retention_end: Option<String>,

    #[serde(default)]
    pub cache_to_archive_promotion: bool,

    #[serde(default = "default_archive_snapshot")]
    pub archive_snapshot: Option<String>,

    /// Factor catalog TOML; the builtin catalog is used when absent
    pub catalog_file: Option<String>,
}

fn default_mode() -> String {
    "cache".to_string()
}

fn default_cache_size_limit_mb() -> u64 {
    500
}

fn default_max_cache_age_minutes() -> u64 {
    24 * 60
}

fn default_archive_snapshot() -> Option<String> {
    dirs::data_local_dir().map(|p| {
        p.join("stratus")
            .join("archive.snapshot")
            .to_string_lossy()
            .to_string()
    })
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            cache_size_limit_mb: default_cache_size_limit_mb(),
            max_cache_age_minutes: default_max_cache_age_minutes(),
            archive_retention_start: None,
            archive_retention_end: None,
            cache_to_archive_promotion: false,
            archive_snapshot: default_archive_snapshot(),
            catalog_file: None,
        }
    }
}

/// Upstream fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// 0 disables the request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_max_concurrent() -> usize {
    8
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Period outside of which nothing is fetched
#[derive(Debug, Clone, Deserialize)]
pub struct ValidityConfig {
    #[serde(default = "default_validity_start")]
    pub start: String,

    #[serde(default = "default_validity_end")]
    pub end: String,
}

fn default_validity_start() -> String {
    "1869-01-01".to_string()
}

fn default_validity_end() -> String {
    "+7305d".to_string()
}

impl Default for ValidityConfig {
    fn default() -> Self {
        Self {
            start: default_validity_start(),
            end: default_validity_end(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("stratus").join("config.toml")),
            Some(PathBuf::from("/etc/stratus/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Storage overrides
        if let Ok(mode) = std::env::var("STRATUS_MODE") {
            self.storage.mode = mode;
        }
        if let Ok(size) = std::env::var("STRATUS_CACHE_SIZE_MB") {
            if let Ok(mb) = size.parse() {
                self.storage.cache_size_limit_mb = mb;
            }
        }
        if let Ok(age) = std::env::var("STRATUS_MAX_CACHE_AGE_MINUTES") {
            if let Ok(minutes) = age.parse() {
                self.storage.max_cache_age_minutes = minutes;
            }
        }
        if let Ok(path) = std::env::var("STRATUS_ARCHIVE_SNAPSHOT") {
            self.storage.archive_snapshot = Some(path);
        }
        if let Ok(path) = std::env::var("STRATUS_CATALOG") {
            self.storage.catalog_file = Some(path);
        }

        // Fetch overrides
        if let Ok(max) = std::env::var("STRATUS_MAX_CONCURRENT_FETCHES") {
            if let Ok(n) = max.parse() {
                self.fetch.max_concurrent = n;
            }
        }
        if let Ok(timeout) = std::env::var("STRATUS_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.fetch.request_timeout_secs = secs;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("STRATUS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("STRATUS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Convert into a validated engine configuration
    pub fn storage_configuration(&self) -> Result<StorageConfiguration, ConfigError> {
        let mode: StorageMode = self.storage.mode.parse().map_err(invalid)?;

        let archive_retention = match (
            &self.storage.archive_retention_start,
            &self.storage.archive_retention_end,
        ) {
            (Some(start), Some(end)) => Some(TimePeriod::parse(start, end).map_err(invalid)?),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "archive_retention_start and archive_retention_end must be set together"
                        .to_string(),
                ))
            }
        };

        let validity_window =
            TimePeriod::parse(&self.validity.start, &self.validity.end).map_err(invalid)?;

        let max_cache_age = match self.storage.max_cache_age_minutes {
            0 => None,
            minutes => Some(
                i64::try_from(minutes)
                    .ok()
                    .and_then(chrono::Duration::try_minutes)
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "max_cache_age_minutes {} is out of range",
                            minutes
                        ))
                    })?,
            ),
        };

        let config = StorageConfiguration {
            mode,
            cache_size_limit_bytes: self.storage.cache_size_limit_mb.saturating_mul(1024 * 1024),
            max_cache_age,
            archive_retention,
            cache_to_archive_promotion: self.storage.cache_to_archive_promotion,
            validity_window,
            max_concurrent_fetches: self.fetch.max_concurrent,
            request_timeout: (self.fetch.request_timeout_secs > 0)
                .then(|| Duration::from_secs(self.fetch.request_timeout_secs)),
            archive_snapshot: if mode.uses_archive() {
                self.storage.archive_snapshot.as_ref().map(PathBuf::from)
            } else {
                None
            },
        };
        config.validate().map_err(invalid)?;
        Ok(config)
    }

    /// The configured factor catalog, or the builtin one
    pub fn catalog(&self) -> Result<StaticCatalog, ConfigError> {
        match &self.storage.catalog_file {
            Some(path) => StaticCatalog::load(Path::new(path)).map_err(invalid),
            None => Ok(StaticCatalog::builtin()),
        }
    }
}

fn invalid(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid(e.to_string())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Stratus Configuration
#
# Environment variables override these settings:
# - STRATUS_MODE
# - STRATUS_CACHE_SIZE_MB
# - STRATUS_MAX_CACHE_AGE_MINUTES
# - STRATUS_ARCHIVE_SNAPSHOT
# - STRATUS_CATALOG
# - STRATUS_MAX_CONCURRENT_FETCHES
# - STRATUS_REQUEST_TIMEOUT_SECS
# - STRATUS_LOG_LEVEL
# - STRATUS_LOG_FORMAT

[storage]
# Storage mode: no_storage, cache, archive, cache_and_archive
mode = "cache"

# Cache budget (MB)
cache_size_limit_mb = 500

# Cached data expires this many minutes after it was written, 0 disables it
max_cache_age_minutes = 1440

# Archive retention, required by the archive modes.
# Bounds are dates (2024-01-31), offsets (-2y, +12h) or "now".
# archive_retention_start = "-2y"
# archive_retention_end = "now"

# Move evicted cache segments into the archive (cache_and_archive only)
cache_to_archive_promotion = false

# Archive snapshot file, loaded at start and written on shutdown
# archive_snapshot = "~/.local/share/stratus/archive.snapshot"

# Factor catalog file; the builtin catalog is used when unset
# catalog_file = "/etc/stratus/factors.toml"

[fetch]
# Concurrent upstream fetches per engine
max_concurrent = 8

# Request deadline in seconds, 0 disables it
request_timeout_secs = 60

[validity]
# Nothing outside this window is fetched
start = "1869-01-01"
end = "+7305d"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml_str(&generate_default_config()).unwrap();
        assert_eq!(config.storage.mode, "cache");
        assert_eq!(config.fetch.max_concurrent, 8);

        let storage = config.storage_configuration().unwrap();
        assert_eq!(storage.mode, StorageMode::Cache);
        assert_eq!(storage.cache_size_limit_bytes, 500 * 1024 * 1024);
        assert_eq!(storage.max_cache_age, Some(chrono::Duration::hours(24)));
        assert_eq!(storage.request_timeout, Some(Duration::from_secs(60)));
        assert!(storage.archive_snapshot.is_none());
    }

    #[test]
    fn test_load_archive_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
mode = "cache_and_archive"
cache_size_limit_mb = 64
max_cache_age_minutes = 0
archive_retention_start = "2020-01-01"
archive_retention_end = "now"
cache_to_archive_promotion = true
archive_snapshot = "/tmp/stratus.snapshot"

[fetch]
request_timeout_secs = 0
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        let storage = config.storage_configuration().unwrap();
        assert_eq!(storage.mode, StorageMode::CacheAndArchive);
        assert_eq!(storage.cache_size_limit_bytes, 64 * 1024 * 1024);
        assert!(storage.cache_to_archive_promotion);
        assert!(storage.max_cache_age.is_none());
        assert!(storage.archive_retention.is_some());
        assert!(storage.request_timeout.is_none());
        assert_eq!(
            storage.archive_snapshot,
            Some(PathBuf::from("/tmp/stratus.snapshot"))
        );
    }

    #[test]
    fn test_invalid_configurations() {
        let config = Config::from_toml_str("[storage]\nmode = \"disk\"\n").unwrap();
        assert!(matches!(
            config.storage_configuration(),
            Err(ConfigError::Invalid(_))
        ));

        // archive mode without retention
        let config = Config::from_toml_str("[storage]\nmode = \"archive\"\n").unwrap();
        assert!(config.storage_configuration().is_err());

        let config = Config::from_toml_str(
            "[storage]\nmode = \"archive\"\narchive_retention_start = \"-1y\"\n",
        )
        .unwrap();
        assert!(config.storage_configuration().is_err());

        // offsets beyond what a duration can hold are rejected, not fatal
        let config = Config::from_toml_str("[validity]\nend = \"+99999999999999999y\"\n").unwrap();
        assert!(matches!(
            config.storage_configuration(),
            Err(ConfigError::Invalid(_))
        ));

        let config =
            Config::from_toml_str("[storage]\nmax_cache_age_minutes = 9223372036854775807\n")
                .unwrap();
        assert!(config.storage_configuration().is_err());

        assert!(matches!(
            Config::from_toml_str("[fetch]\nmax_concurrent = \"many\"\n"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/stratus.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_builtin_catalog_by_default() {
        use crate::catalog::{FactorCatalog, FactorId};
        let catalog = Config::default().catalog().unwrap();
        assert_eq!(catalog.resolve("2t"), Some(FactorId(167)));
    }
}
