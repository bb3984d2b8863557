//! Settings of the file-backed family

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub enabled: bool,
    /// Directory whose matching files become resources.
    pub root: PathBuf,
    /// Glob patterns, relative to `root`.
    pub patterns: Vec<String>,
    /// Validity window of a file snapshot, in seconds. At least one.
    pub max_age_secs: u64,
    /// Quiet period before a burst of change events becomes one re-read.
    pub debounce_ms: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        FilesConfig {
            enabled: true,
            root: PathBuf::from("data"),
            patterns: vec![
                "**/*.nt".to_string(),
                "**/*.ttl".to_string(),
                "**/*.json".to_string(),
            ],
            max_age_secs: 300,
            debounce_ms: 200,
            fetch_timeout_secs: 5,
        }
    }
}

impl FilesConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_max_age_is_clamped() {
        let config = FilesConfig {
            max_age_secs: 0,
            ..FilesConfig::default()
        };
        assert_eq!(config.max_age(), Duration::from_secs(1));
        assert_eq!(FilesConfig::default().max_age(), Duration::from_secs(300));
    }
}
