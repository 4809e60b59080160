//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `simhash_size` is not a multiple of 8 in 8..=512
    /// - `concurrency` is 0 or above 256
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_download_bytes` is 0 or exceeds 50MB
    /// - `max_retries` exceeds 10
    /// - `expire_secs` is 0
    /// - `user_agent`, `index_url` or `replay_url` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simhash_size == 0 || self.simhash_size % 8 != 0 || self.simhash_size > 512 {
            return Err(invalid("simhash_size", "must be a multiple of 8 between 8 and 512"));
        }

        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be greater than 0"));
        }
        if self.concurrency > 256 {
            return Err(invalid("concurrency", "must not exceed 256"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_download_bytes == 0 {
            return Err(invalid("max_download_bytes", "must be greater than 0"));
        }
        if self.max_download_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_download_bytes", "must not exceed 50MB"));
        }

        if self.max_retries > 10 {
            return Err(invalid("max_retries", "must not exceed 10"));
        }

        if self.expire_secs == 0 {
            return Err(invalid("expire_secs", "must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.index_url.is_empty() {
            return Err(invalid("index_url", "must not be empty"));
        }
        if self.replay_url.is_empty() {
            return Err(invalid("replay_url", "must not be empty"));
        }

        if self.snapshots_per_page == Some(0) {
            tracing::warn!("snapshots_per_page is 0; year queries will not be paged");
        }

        Ok(())
    }
}
