//! Process-wide content digest -> simhash cache.
//!
//! Captures that share an archive digest have byte-identical bodies, so their
//! fingerprint only needs computing once. The cache is shared by every job and
//! lives as long as the process.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Concurrent map from content digest to encoded simhash.
///
/// A miss followed by a store is not atomic; two workers racing on the same
/// digest both compute it and store the same value.
#[derive(Debug, Clone, Default)]
pub struct DigestCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached simhash for `digest`, if any.
    pub async fn get(&self, digest: &str) -> Option<String> {
        self.entries.read().await.get(digest).cloned()
    }

    /// Store the simhash computed for `digest`.
    pub async fn put(&self, digest: &str, simhash: &str) {
        self.entries
            .write()
            .await
            .insert(digest.to_string(), simhash.to_string());
    }

    /// Number of digests fingerprinted so far.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
