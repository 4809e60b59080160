//! Client code for wbdiff.
//!
//! This crate provides the archive HTTP client, feature extraction, and the
//! job orchestrator that ties them to the result store.

pub mod archive;
pub mod extract;
pub mod job;

pub use archive::{ArchiveClient, ArchiveConfig, ArchiveSource, Capture, validate_target, validate_year};
pub use extract::extract_features;
pub use job::{JobSettings, Orchestrator};
