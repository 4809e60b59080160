//! Core types and shared functionality for wbdiff.
//!
//! This crate provides:
//! - SimHash fingerprint encoding
//! - Result store with SQLite backend and the queries over it
//! - Process-wide digest cache and job registry
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod digest;
pub mod error;
pub mod jobs;
pub mod query;
pub mod simhash;

pub use cache::{CacheDb, url_key};
pub use config::{AppConfig, ConfigError};
pub use digest::DigestCache;
pub use error::Error;
pub use jobs::{Job, JobRegistry, JobState};
pub use query::{CaptureResult, CompressedCaptures, QueryResult};
pub use simhash::{FeatureSet, Fingerprint};
