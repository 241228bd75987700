//! Configuration management for docsync.
//!
//! Parses `docsync.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `database.url`
//! - `data.root_dir`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the data root directory.
    pub root_dir: Option<PathBuf>,
    /// Override the database connection string.
    pub database_url: Option<String>,
    /// Override the watcher debounce window.
    pub debounce_ms: Option<u64>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "docsync.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database connection configuration.
    pub database: DatabaseConfig,
    /// Data directory configuration (paths are relative strings from TOML).
    data: DataConfigRaw,
    /// Filesystem watch configuration.
    pub watch: WatchConfig,
    /// Per-directory sync policy.
    pub sync: SyncConfig,

    /// Resolved data configuration (set after loading).
    #[serde(skip)]
    pub data_resolved: DataConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Database connection configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string (e.g. `sqlite://docsync.db`).
    pub url: Option<String>,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// Raw data configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DataConfigRaw {
    root_dir: Option<String>,
}

/// Resolved data configuration with absolute paths.
#[derive(Debug, Default)]
pub struct DataConfig {
    /// Root directory holding one subdirectory per collection.
    pub root_dir: PathBuf,
}

/// Filesystem watch configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Window in which repeated events for one file are coalesced.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Per-directory sync policy.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Close a directory's watch after this many failed events in a row.
    ///
    /// `None` keeps every watch open regardless of failures.
    pub max_consecutive_failures: Option<u32>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`database.url`").
        field: String,
        /// Error message (e.g., "${`DOCSYNC_DATABASE_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `docsync.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(root_dir) = &settings.root_dir {
            self.data_resolved.root_dir.clone_from(root_dir);
        }
        if let Some(url) = &settings.database_url {
            self.database.url = Some(url.clone());
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.watch.debounce_ms = debounce_ms;
        }
    }

    /// Get the database connection string.
    ///
    /// The connection string is the one setting without a usable default, so
    /// commands that touch the database call this instead of reading
    /// `database.url` directly.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if no connection string is configured.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        let url = self.database.url.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "database.url is required (set it in docsync.toml or DOCSYNC_DATABASE_URL)"
                    .to_owned(),
            )
        })?;
        require_non_empty(url, "database.url")?;
        Ok(url)
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            database: DatabaseConfig::default(),
            data: DataConfigRaw::default(),
            watch: WatchConfig::default(),
            sync: SyncConfig::default(),
            data_resolved: DataConfig {
                root_dir: base.join("data"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file. A missing `database.url`
    /// is not an error here since the CLI may still supply it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.database.url {
            require_non_empty(url, "database.url")?;
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be greater than 0".to_owned(),
            ));
        }
        if self.sync.max_consecutive_failures == Some(0) {
            return Err(ConfigError::Validation(
                "sync.max_consecutive_failures must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref url) = self.database.url {
            self.database.url = Some(expand::expand_env(url, "database.url")?);
        }
        if let Some(ref root_dir) = self.data.root_dir {
            self.data.root_dir = Some(expand::expand_env(root_dir, "data.root_dir")?);
        }
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.data_resolved = DataConfig {
            root_dir: config_dir.join(self.data.root_dir.as_deref().unwrap_or("data")),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.data_resolved.root_dir, PathBuf::from("/test/data"));
        assert_eq!(config.database.url, None);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.watch.debounce_ms, 100);
        assert_eq!(config.sync.max_consecutive_failures, None);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database.url, None);
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[database]
url = "sqlite://records.db"
max_connections = 2

[data]
root_dir = "collections"

[watch]
debounce_ms = 250

[sync]
max_consecutive_failures = 3
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.database.url.as_deref(), Some("sqlite://records.db"));
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(
            config.data_resolved.root_dir,
            PathBuf::from("/project/collections")
        );
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.sync.max_consecutive_failures, Some(3));
    }

    #[test]
    fn test_require_database_url_missing() {
        let config = Config::default_with_base(Path::new("/test"));
        let err = config.require_database_url().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_require_database_url_empty() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.database.url = Some(String::new());
        let err = config.require_database_url().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: database.url cannot be empty"
        );
    }

    #[test]
    fn test_cli_settings_override() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.apply_cli_settings(&CliSettings {
            root_dir: Some(PathBuf::from("/elsewhere")),
            database_url: Some("sqlite://cli.db".to_owned()),
            debounce_ms: Some(0),
        });

        assert_eq!(config.data_resolved.root_dir, PathBuf::from("/elsewhere"));
        assert_eq!(config.require_database_url().unwrap(), "sqlite://cli.db");
        assert_eq!(config.watch.debounce_ms, 0);
    }

    #[test]
    fn test_validate_rejects_zero_failure_threshold() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.sync.max_consecutive_failures = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_connections() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/docsync.toml")), None);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_file_resolves_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "[database]\nurl = \"${DOCSYNC_TEST_UNSET_URL:-sqlite://fallback.db}\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.database.url.as_deref(), Some("sqlite://fallback.db"));
        assert_eq!(config.data_resolved.root_dir, dir.path().join("data"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_from_file_unset_env_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[database]\nurl = \"${DOCSYNC_TEST_UNSET_URL}\"\n").unwrap();

        let result = Config::load(Some(&path), None);
        assert!(matches!(result, Err(ConfigError::EnvVar { .. })));
    }
}
