//! Application configuration management.
//!
//! Configuration is stored at `~/.config/shellcache/config.json` and
//! supplies defaults for the command line: the app origin, the deployment
//! file, where regions are kept on disk, and the region names.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellcache_core::RegionNames;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub origin: Option<String>,
    pub deployment: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
    pub regions: RegionNames,
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&tmp.path().join("nope.json"))).unwrap();
        assert!(config.origin.is_none());
        assert_eq!(config.regions, RegionNames::default());
    }

    #[test]
    fn test_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"origin": "https://app.test", "regions": {"persistent": "my-cache"}}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.origin.as_deref(), Some("https://app.test"));
        assert_eq!(config.regions.persistent, "my-cache");
        assert_eq!(config.regions.staging, RegionNames::default().staging);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_storage_dir_override() {
        let config = Config {
            storage_dir: Some(PathBuf::from("/tmp/shellcache-test")),
            ..Config::default()
        };
        assert_eq!(
            config.storage_dir().unwrap(),
            PathBuf::from("/tmp/shellcache-test")
        );
    }
}
