//! Gateway configuration: a TOML file, then `SSP_*` environment overrides.
//!
//! Every field has a default, so a missing file or an empty table is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ssp_core::{CacheConfig, DiskStore, GraphStore, MemoryStore};
use ssp_files::FilesConfig;
use ssp_server::ServerConfig;
use ssp_virtual::VirtualSensorsConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key} ({value:?}): {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Directory of the disk backend.
    pub path: PathBuf,
    pub operation_timeout_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            backend: CacheBackend::Memory,
            path: PathBuf::from(".ssp/cache"),
            operation_timeout_secs: 5,
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            operation_timeout: Duration::from_secs(self.operation_timeout_secs.max(1)),
            ..CacheConfig::default()
        }
    }

    /// The store behind the cache task.
    pub fn open_store(&self) -> ssp_core::Result<Box<dyn GraphStore>> {
        Ok(match self.backend {
            CacheBackend::Memory => Box::new(MemoryStore::new()),
            CacheBackend::Disk => Box::new(DiskStore::open(&self.path)?),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheSettings,
    pub files: FilesConfig,
    pub virtual_sensors: VirtualSensorsConfig,
}

impl Config {
    /// Load `.env`, then `path` if it exists, then the environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = if path.exists() {
            Self::from_path(path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Apply `SSP_HOST`, `SSP_PORT` and `SSP_BASE_URI`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = var("SSP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SSP_PORT") {
            self.server.port = port.parse().map_err(|e| ConfigError::InvalidValue {
                key: "SSP_PORT",
                value: port.clone(),
                reason: format!("must be a valid port number (0-65535): {}", e),
            })?;
        }
        if let Some(base) = var("SSP_BASE_URI") {
            self.server.base_uri = Some(base);
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(&dir.path().join("absent.toml"));
        assert!(matches!(config, Err(ConfigError::Io { .. })));

        let mut config = Config::default();
        config.apply_env(env(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.base_uri(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssp.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9000
base_uri = "http://gateway.example/"

[cache]
backend = "disk"
path = "/var/lib/ssp"

[virtual_sensors]
interval_secs = 15
"#,
        )
        .unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.base_uri(), "http://gateway.example");
        assert_eq!(config.cache.backend, CacheBackend::Disk);
        assert_eq!(config.cache.operation_timeout_secs, 5);
        assert_eq!(config.virtual_sensors.interval_secs, 15);
        assert_eq!(config.files, FilesConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("SSP_HOST", "0.0.0.0"), ("SSP_PORT", "7000"), ("SSP_BASE_URI", "http://gw")]))
            .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.base_uri(), "http://gw");

        let err = Config::default().apply_env(env(&[("SSP_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "SSP_PORT", .. }));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let parsed: Result<Config, _> = toml::from_str("[cache]\nbackend = \"redis\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_effective_config_round_trips_through_toml() {
        let text = Config::default().to_toml().unwrap();
        assert!(text.contains("[server]"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_stores() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings {
            backend: CacheBackend::Disk,
            path: dir.path().join("cache"),
            operation_timeout_secs: 0,
        };
        assert!(settings.open_store().is_ok());
        assert_eq!(settings.cache_config().operation_timeout, Duration::from_secs(1));
        assert!(CacheSettings::default().open_store().is_ok());
    }
}
