//! Application configuration, stored as JSON.
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::error::ConfigError;
use crate::storage::pool::PoolConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: usize,
    pub acquire_timeout_secs: u64,
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("workbench.db"),
            pool_size: 5,
            acquire_timeout_secs: 10,
            busy_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            path: self.path.clone(),
            pool_size: self.pool_size,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            busy_timeout: Duration::from_secs(self.busy_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `<user_id>_<name>.weights` files.
    pub weights_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig { weights_dir: PathBuf::from("models/saved") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: "info".to_owned() }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Loads `path`, or writes the defaults there when it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<AppConfig, ConfigError> {
        if path.exists() {
            return AppConfig::load(path);
        }
        let config = AppConfig::default();
        config.save(path)?;
        info!(path = %path.display(), "wrote default configuration");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        fs::write(path, json).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.json");
        let config = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"database": {"pool_size": 2}, "logging": {"level": "debug"}}"#).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.database.path, PathBuf::from("workbench.db"));
        assert_eq!(config.storage.weights_dir, PathBuf::from("models/saved"));
        assert_eq!(config.logging.level, "debug");

        let pool = config.database.pool_config();
        assert_eq!(pool.acquire_timeout, Duration::from_secs(10));
        assert_eq!(pool.busy_timeout, Duration::from_secs(30));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
