//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `MIGRATOR_CONFIG` environment variable
//! 3. Per-user config file (`~/.config/migrator/config.toml` on Linux)
//! 4. Compiled defaults (no file)
//!
//! A missing config file never terminates the program: compiled defaults
//! are used and `ConfigSource::Missing` names the absent file. A file that exists but cannot be parsed
//! is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MIGRATOR_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub validator: ValidatorSection,
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default tracing level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[validator]` section
///
/// Every field is optional; unset fields fall back to the validator's own
/// defaults and can be overridden from the command line.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ValidatorSection {
    pub batch_size: Option<usize>,
    /// Modification-time lower bound in epoch milliseconds
    pub watermark: Option<i64>,
    pub poll_interval_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub direction: Option<String>,
    /// `row` or `batch`
    pub strategy: Option<String>,
    /// `skip` or `abort`
    pub error_policy: Option<String>,
    pub watermark_column: Option<String>,
    #[serde(default)]
    pub ignore_columns: Vec<String>,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve and load configuration, degrading to defaults when no file exists
    ///
    /// Nothing is logged here; callers report the returned `ConfigSource`
    /// once their subscriber is installed.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<(Self, ConfigSource)> {
        match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                let config = Self::load(&path)?;
                Ok((config, ConfigSource::File(path)))
            }
            Some(path) => Ok((Self::default(), ConfigSource::Missing(path))),
            None => Ok((Self::default(), ConfigSource::Defaults)),
        }
    }
}

/// Where `TomlConfig::load_or_default` took its values from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// This file was named but does not exist
    Missing(PathBuf),
    /// No tier named a file
    Defaults,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Configuration loaded from {}", path.display()),
            ConfigSource::Missing(path) => warn!(
                "Config file not found: {} (using compiled defaults)",
                path.display()
            ),
            ConfigSource::Defaults => info!("No config file found (using compiled defaults)"),
        }
    }
}

/// Resolve which config file to read, following the priority order above
///
/// Returns `None` only when no tier names a file; tiers 1 and 2 are
/// returned even if the file does not exist so the caller can warn about it.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file, only if present
    user_config_path().filter(|p| p.exists())
}

/// Per-user config file location for the platform
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("migrator").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.validator.batch_size.is_none());
        assert!(config.validator.ignore_columns.is_empty());
    }

    #[test]
    fn test_full_validator_section() {
        let config = TomlConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"

            [validator]
            batch_size = 250
            watermark = 1700000000000
            poll_interval_ms = 500
            read_timeout_ms = 2000
            direction = "mysql->sqlite"
            strategy = "batch"
            error_policy = "abort"
            watermark_column = "updated_at"
            ignore_columns = ["updated_at", "created_at"]
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        let v = &config.validator;
        assert_eq!(v.batch_size, Some(250));
        assert_eq!(v.watermark, Some(1_700_000_000_000));
        assert_eq!(v.poll_interval_ms, Some(500));
        assert_eq!(v.read_timeout_ms, Some(2000));
        assert_eq!(v.direction.as_deref(), Some("mysql->sqlite"));
        assert_eq!(v.strategy.as_deref(), Some("batch"));
        assert_eq!(v.error_policy.as_deref(), Some("abort"));
        assert_eq!(v.watermark_column.as_deref(), Some("updated_at"));
        assert_eq!(v.ignore_columns, vec!["updated_at", "created_at"]);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[validator]\nbatch_size = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
