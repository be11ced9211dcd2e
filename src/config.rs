//! Importer configuration.
//!
//! Values are layered: built-in defaults, then `config.json` in the user
//! config directory, then `.env` / environment variables. The CLI applies
//! its own flags on top.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8888";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 50;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImporterConfig {
    /// Backend origin, without a trailing slash
    pub base_url: String,
    /// Codes per validation request
    pub batch_size: usize,
    /// Pause between two validation requests
    pub batch_delay_ms: u64,
    /// Auto-organize progress polling period
    pub poll_interval_ms: u64,
    /// Upper bound for imported files, in bytes
    pub max_file_size: u64,
    /// Ask the backend to translate stock names
    pub translate_names: bool,
    /// Market hint forwarded to validation (backend default when absent)
    pub market: Option<String>,
    /// Per-request timeout. None means requests may run indefinitely.
    pub request_timeout_secs: Option<u64>,
    pub log_level: String,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            translate_names: true,
            market: None,
            request_timeout_secs: None,
            log_level: "info".to_string(),
        }
    }
}

impl ImporterConfig {
    /// Defaults, overlaid with the config file and the environment.
    ///
    /// Problems with the config file do not abort loading; they are returned
    /// so the caller can log them once a logger is installed.
    pub fn load() -> (Self, Vec<String>) {
        dotenvy::dotenv().ok();
        Self::load_from(default_config_path().as_deref(), |key| env::var(key).ok())
    }

    pub fn load_from<F>(path: Option<&Path>, lookup: F) -> (Self, Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path).unwrap_or_else(|e| {
                warnings.push(format!("Ignoring config file {}: {}", path.display(), e));
                Self::default()
            }),
            _ => Self::default(),
        };

        config.apply_env(lookup);
        (config, warnings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("WATCHLIST_API_URL") {
            self.base_url = url;
        }
        if let Some(v) = lookup("WATCHLIST_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.batch_size = v;
        }
        if let Some(v) = lookup("WATCHLIST_BATCH_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.batch_delay_ms = v;
        }
        if let Some(v) = lookup("WATCHLIST_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = v;
        }
        if let Some(v) = lookup("WATCHLIST_MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
            self.max_file_size = v;
        }
        if let Some(v) = lookup("WATCHLIST_TRANSLATE") {
            self.translate_names = matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
        if let Some(v) = lookup("WATCHLIST_MARKET") {
            self.market = Some(v).filter(|m| !m.trim().is_empty());
        }
        if let Some(v) = lookup("WATCHLIST_LOG_LEVEL") {
            self.log_level = v;
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        self.batch_size = self.batch_size.max(1);
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// `<config dir>/watchlist-import/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("watchlist-import").join("config.json"))
}
