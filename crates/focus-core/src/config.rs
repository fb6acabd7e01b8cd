use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which platform restriction backend to build
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Process-local only; nothing outside this process is told
    Memory,
    /// Publish the blocklist file for the OS hook to enforce
    #[default]
    Blocklist,
}

/// Runtime settings for the focus core, read from `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FocusConfig {
    /// Unlock attempts allowed before the UI escalates
    pub max_unlock_attempts: u32,
    /// Upper bound on a single session store call
    pub store_timeout_ms: u64,
    /// Upper bound on a single platform block/unblock call
    pub platform_timeout_ms: u64,
    /// Essays shorter than this count as skipped when abandoning
    pub min_essay_words: u32,
    pub platform: PlatformKind,
    /// Defaults to `<data_dir>/focus.db`
    pub database_path: Option<PathBuf>,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            max_unlock_attempts: 3,
            store_timeout_ms: 5_000,
            platform_timeout_ms: 5_000,
            min_essay_words: 50,
            platform: PlatformKind::default(),
            database_path: None,
        }
    }
}

impl FocusConfig {
    /// Parse a TOML config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse TOML text, filling unspecified keys with defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load `<data_dir>/config.toml`, or defaults if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the data dir cannot be resolved or the file is invalid
    pub fn load_or_default() -> Result<Self> {
        let path = get_data_dir()?.join("config.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    #[must_use]
    pub const fn platform_timeout(&self) -> Duration {
        Duration::from_millis(self.platform_timeout_ms)
    }

    /// Resolve the SQLite path, falling back to the data dir
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the data dir cannot be resolved
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_dir()?.join("focus.db")),
        }
    }
}

/// Get the local data directory for focus.
///
/// `FOCUS_DATA_DIR` overrides the platform default.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("FOCUS_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("focus");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FocusConfig::from_toml("max_unlock_attempts = 5\nplatform = \"memory\"").unwrap();
        assert_eq!(config.max_unlock_attempts, 5);
        assert_eq!(config.platform, PlatformKind::Memory);
        assert_eq!(config.store_timeout_ms, 5_000);
        assert_eq!(config.min_essay_words, 50);
    }

    #[test]
    fn test_rejects_unknown_platform() {
        assert!(FocusConfig::from_toml("platform = \"screen_time\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "store_timeout_ms = 250\ndatabase_path = \"/tmp/x.db\"").unwrap();

        let config = FocusConfig::load(&path).unwrap();
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/x.db"));
    }
}
