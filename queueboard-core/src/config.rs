use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::Result;

const DEFAULT_MAX_QUEUES: usize = 19;
const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 5_000;

/// Board settings, read from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// How many queues the board keeps before evicting the oldest
    pub max_queues: usize,
    /// Persist queues across restarts. When off the board never touches storage.
    pub persistent_queues: bool,
    /// Quiet period before pending queue writes are flushed
    pub save_debounce_ms: u64,
    pub database_path: PathBuf,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_queues: DEFAULT_MAX_QUEUES,
            persistent_queues: true,
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            database_path: PathBuf::from("queueboard.db"),
        }
    }
}

impl BoardConfig {
    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: BoardConfig = toml::from_str(text)?;
        if config.max_queues == 0 {
            log::warn!("max_queues must be at least 1, clamping");
            config.max_queues = 1;
        }
        Ok(config)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = BoardConfig::from_toml("max_queues = 4\n").unwrap();
        assert_eq!(config.max_queues, 4);
        assert!(config.persistent_queues);
        assert_eq!(config.save_debounce(), Duration::from_secs(5));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let config = BoardConfig::from_toml("max_queues = 0\npersistent_queues = false").unwrap();
        assert_eq!(config.max_queues, 1);
        assert!(!config.persistent_queues);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(BoardConfig::from_toml("max_queues = \"many\"").is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = BoardConfig::load(Path::new("/nonexistent/queueboard.toml")).unwrap();
        assert_eq!(config, BoardConfig::default());
    }
}
