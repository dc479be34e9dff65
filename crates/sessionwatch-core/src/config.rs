//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, the storage backend for the persisted
//! session, the expiry warning window, and the last used email.
//!
//! Configuration is stored at `~/.config/sessionwatch/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::session::SessionSettings;
use crate::store::{FileStore, KeyValueStore, KeyringStore};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "sessionwatch";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
const API_URL_ENV: &str = "SESSIONWATCH_API_URL";

/// Environment variable overriding `last_email`
const EMAIL_ENV: &str = "SESSIONWATCH_EMAIL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Warn five minutes before expiry unless configured otherwise
const DEFAULT_WARNING_WINDOW_SECS: u64 = 300;

/// Where the persisted session lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub warning_window_secs: u64,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage: StorageBackend::default(),
            warning_window_secs: DEFAULT_WARNING_WINDOW_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults if absent), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(email) = std::env::var(EMAIL_ENV) {
            if !email.is_empty() {
                self.last_email = Some(email);
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the file-backed session store
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Directory for log files
    pub fn log_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Build the configured session storage backend
    pub fn storage_backend(&self) -> Result<Box<dyn KeyValueStore>> {
        Ok(match self.storage {
            StorageBackend::File => Box::new(FileStore::new(self.data_dir()?)),
            StorageBackend::Keyring => Box::new(KeyringStore::new(APP_NAME)),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            warning_window: Duration::from_secs(self.warning_window_secs),
            ..SessionSettings::default()
        }
    }
}
