//! Cache configuration.
//!
//! Controls the on-disk content cache via the `[cache]` section of `atelier.toml`.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_DIRECTORY: &str = "data/cache";

/// Cache configuration from `atelier.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the file-backed cache. When off, every lookup misses.
    pub enabled: bool,
    /// Directory holding `<key>.cache` entries and their lock files.
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            directory: settings.directory.clone(),
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
