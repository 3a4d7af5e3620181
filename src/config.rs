use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::catalog::PageStop;

/// Environment variable that overrides `catalog.access_token`.
pub const TOKEN_ENV: &str = "MEDIA_ETL_ACCESS_TOKEN";

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the file is optional.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Directory of newline-delimited JSON track exports.
    pub source_dir: Option<PathBuf>,
    /// Catalog search API settings.
    pub catalog: CatalogConfig,
    /// Debug artifact output.
    pub debug: DebugConfig,
    /// Extra offline identifiers (merged over the built-in fixture tables).
    pub offline: OfflineConfig,
}

/// Catalog API configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    /// When false the catalog is never contacted and offline ids are used.
    pub enabled: bool,
    /// API root, e.g. `https://api.spotify.com/v1`.
    pub base_url: String,
    /// Bearer token. The OAuth dance happens outside this tool.
    pub access_token: Option<String>,
    /// Market (ISO 3166-1 alpha-2) passed to every search.
    pub market: String,
    /// Page size for search requests and audio-feature batches (1-50).
    pub page_limit: u32,
    /// Pause between consecutive API requests in milliseconds.
    pub rate_limit_ms: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Matches scoring below this (0-100) are flagged for review.
    pub confidence_threshold: f64,
    /// When to stop paginating a search.
    pub page_stop: PageStop,
    /// The search API refuses offsets past this value.
    pub max_offset: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.spotify.com/v1".to_string(),
            access_token: None,
            market: "US".to_string(),
            page_limit: 50,
            rate_limit_ms: 500,
            timeout_secs: 2,
            confidence_threshold: 80.0,
            page_stop: PageStop::EmptyItems,
            max_offset: 1000,
        }
    }
}

/// Debug artifact configuration.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DebugConfig {
    /// Write low-confidence matches and raw query results as JSON.
    pub enabled: bool,
    /// Output directory (defaults to `<data dir>/api`).
    pub dir: Option<PathBuf>,
}

/// Offline keyword → identifier overrides, one table per entity type.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct OfflineConfig {
    pub artists: HashMap<String, String>,
    pub albums: HashMap<String, String>,
    pub tracks: HashMap<String, String>,
}

impl AppConfig {
    /// Load config from `~/.config/media-etl/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.with_env_token().validated()
    }

    /// Load config from an explicit path, falling back to defaults on error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    fn with_env_token(mut self) -> Self {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.catalog.access_token = Some(token.trim().to_string());
            }
        }
        self
    }

    /// Clamp out-of-range values, warning about each one.
    pub fn validated(mut self) -> Self {
        let c = &mut self.catalog;
        if !(1..=50).contains(&c.page_limit) {
            let clamped = c.page_limit.clamp(1, 50);
            log::warn!("catalog.page_limit {} out of range 1-50, using {clamped}", c.page_limit);
            c.page_limit = clamped;
        }
        if !(0.0..=100.0).contains(&c.confidence_threshold) || c.confidence_threshold.is_nan() {
            let clamped = if c.confidence_threshold.is_nan() {
                CatalogConfig::default().confidence_threshold
            } else {
                c.confidence_threshold.clamp(0.0, 100.0)
            };
            log::warn!(
                "catalog.confidence_threshold {} out of range 0-100, using {clamped}",
                c.confidence_threshold
            );
            c.confidence_threshold = clamped;
        }
        if c.timeout_secs == 0 {
            log::warn!("catalog.timeout_secs must be positive, using 1");
            c.timeout_secs = 1;
        }
        self
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

impl DebugConfig {
    /// Resolve the artifact directory using the XDG data directory.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        match ProjectDirs::from("", "", crate::APP_NAME) {
            Some(dirs) => dirs.data_dir().join("api"),
            None => PathBuf::from("api"),
        }
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("media-etl.db")
    } else {
        // Fallback: current directory
        PathBuf::from("media-etl.db")
    }
}
