//! Application configuration.
//!
//! Loaded from YAML files and environment variables into a single Config
//! struct shared by the composition and storage layers.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "WEFT_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "WEFT";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "WEFT_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transaction decoration defaults.
    pub transactions: TransactionConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// Transaction decoration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Whether handlers are transactional unless overridden per handler.
    pub default_enabled: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_enabled: true,
        }
    }
}

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-memory storage.
    #[default]
    Memory,
    /// SQLite storage (requires `sqlite` feature).
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type (memory, sqlite).
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite backend configuration.
    pub sqlite: SqliteConfig,
}

/// SQLite backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the database file.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "./data/weft.db".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.transactions.default_enabled);
        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert_eq!(config.storage.sqlite.path, "./data/weft.db");
    }

    #[test]
    fn parse_yaml() {
        let yaml = r#"
transactions:
  default_enabled: false

storage:
  type: sqlite
  sqlite:
    path: /tmp/test.db
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.transactions.default_enabled);
        assert_eq!(config.storage.storage_type, StorageType::Sqlite);
        assert_eq!(config.storage.sqlite.path, "/tmp/test.db");
    }
}
