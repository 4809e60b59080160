//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WBDIFF_*)
//! 2. TOML config file (if WBDIFF_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WBDIFF_*)
/// 2. TOML config file (if WBDIFF_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite result store.
    ///
    /// Set via WBDIFF_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for archive requests.
    ///
    /// Set via WBDIFF_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Auth token sent to the archive as a `cdx_auth_token` cookie.
    ///
    /// Set via WBDIFF_CDX_AUTH_TOKEN environment variable.
    #[serde(default)]
    pub cdx_auth_token: Option<String>,

    /// Capture index (timemap) endpoint.
    #[serde(default = "default_index_url")]
    pub index_url: String,

    /// Replay endpoint prefix; captures live at `{replay_url}/{timestamp}id_/{url}`.
    #[serde(default = "default_replay_url")]
    pub replay_url: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via WBDIFF_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes read from a single capture.
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: usize,

    /// Additional download attempts after the first one fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Captures processed concurrently by one job.
    ///
    /// Set via WBDIFF_CONCURRENCY environment variable.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// SimHash width in bits.
    #[serde(default = "default_simhash_size")]
    pub simhash_size: usize,

    /// Optional `limit` passed to the capture index.
    #[serde(default)]
    pub snapshots_limit: Option<u32>,

    /// Page size for year queries; unset or 0 returns everything.
    #[serde(default)]
    pub snapshots_per_page: Option<usize>,

    /// Lifetime of a stored result record in seconds.
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,

    /// How long finished jobs stay visible in the registry, in seconds.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./wbdiff-cache.sqlite")
}

fn default_user_agent() -> String {
    "wayback-discover-diff".into()
}

fn default_index_url() -> String {
    "https://web.archive.org/web/timemap".into()
}

fn default_replay_url() -> String {
    "https://web.archive.org/web".into()
}

fn default_timeout_ms() -> u64 {
    35_000
}

fn default_max_download_bytes() -> usize {
    1_000_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_concurrency() -> usize {
    20
}

fn default_simhash_size() -> usize {
    256
}

fn default_expire_secs() -> u64 {
    86_400 // 24h
}

fn default_job_retention_secs() -> u64 {
    86_400
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            cdx_auth_token: None,
            index_url: default_index_url(),
            replay_url: default_replay_url(),
            timeout_ms: default_timeout_ms(),
            max_download_bytes: default_max_download_bytes(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
            simhash_size: default_simhash_size(),
            snapshots_limit: None,
            snapshots_per_page: None,
            expire_secs: default_expire_secs(),
            job_retention_secs: default_job_retention_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retention window for finished jobs.
    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WBDIFF_`
    /// 2. TOML file from `WBDIFF_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WBDIFF_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WBDIFF_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
