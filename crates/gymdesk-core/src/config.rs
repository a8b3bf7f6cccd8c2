//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend base URL, the request timeout and the last signed-in username.
//!
//! Configuration is stored at `~/.config/gymdesk/config.json`. The
//! `GYMDESK_API_URL` environment variable overrides the stored base URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gymdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the backend origin
pub const API_URL_ENV: &str = "GYMDESK_API_URL";

/// Backend used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// HTTP request timeout in seconds; a slower backend is reported as unreachable.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base API URL: environment override, then config file, then default.
    pub fn api_base_url(&self) -> Result<Url> {
        let from_env = std::env::var(API_URL_ENV).ok().filter(|v| !v.trim().is_empty());
        Self::resolve_base_url(from_env.as_deref(), self.api_url.as_deref())
    }

    fn resolve_base_url(from_env: Option<&str>, from_file: Option<&str>) -> Result<Url> {
        let raw = from_env.or(from_file).unwrap_or(DEFAULT_API_URL).trim();
        let url = Url::parse(raw).with_context(|| format!("Invalid API base URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API base URL must use http or https: {}", raw);
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_precedence() {
        let url = Config::resolve_base_url(Some("https://env.example/api"), Some("http://file/api"))
            .expect("env url");
        assert_eq!(url.as_str(), "https://env.example/api");

        let url = Config::resolve_base_url(None, Some("http://file.example/api")).expect("file url");
        assert_eq!(url.as_str(), "http://file.example/api");

        let url = Config::resolve_base_url(None, None).expect("default url");
        assert_eq!(url.as_str(), "http://localhost:8000/api");
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        assert!(Config::resolve_base_url(Some("not a url"), None).is_err());
        assert!(Config::resolve_base_url(Some("ftp://example.com"), None).is_err());
    }

    #[test]
    fn test_timeout_default_and_floor() {
        assert_eq!(Config::default().request_timeout(), Duration::from_secs(10));
        let config = Config {
            request_timeout_secs: Some(0),
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config {
            api_url: Some("https://gym.example/api".to_string()),
            request_timeout_secs: None,
            last_username: Some("frontdesk".to_string()),
        };
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.last_username.as_deref(), Some("frontdesk"));
        assert_eq!(loaded.api_url.as_deref(), Some("https://gym.example/api"));
    }
}
