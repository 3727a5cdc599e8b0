//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILINDEX_CONFIG` (environment variable)
//! 2. `~/.config/mailindex/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailindex\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Size caps applied during ingestion.
    pub limits: Limits,
    /// Settings consumed by the external admin UI process.
    pub admin: AdminConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Override the database location.
    pub db_path: Option<PathBuf>,
}

/// Size caps applied during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Byte cap for decoded subject/in-reply-to/from values and
    /// attachment file names.
    pub max_header_bytes: usize,
    /// Byte cap for an address's combined display-name list.
    pub max_name_list_bytes: usize,
    /// Byte cap for the plain-text body.
    pub max_text_bytes: usize,
    /// Byte cap for the HTML body.
    pub max_html_bytes: usize,
    /// When set, lowers the store's per-record byte ceiling. Mostly
    /// useful for exercising the adaptive-save path; leave unset to use
    /// the engine default.
    pub max_record_bytes: Option<i32>,
}

/// Settings consumed by the external admin UI process, kept here so the
/// whole deployment reads one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Development mode only: authenticate every admin request as the
    /// built-in superuser account. Must stay off in any shared
    /// deployment.
    pub dev_superuser: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            db_path: None,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 1024,
            max_name_list_bytes: 1024,
            max_text_bytes: 256 * 1024,      // 256 KiB
            max_html_bytes: 2 * 1024 * 1024, // 2 MiB
            max_record_bytes: None,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILINDEX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailindex").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailindex")
}

/// Return the database path: configured override or the platform default.
pub fn db_path(config: &Config) -> PathBuf {
    if let Some(ref path) = config.general.db_path {
        return path.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailindex")
        .join("index.db")
}
