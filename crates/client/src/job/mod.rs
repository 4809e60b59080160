//! Simhash calculation jobs.
//!
//! ### Lifecycle
//! - [`Orchestrator::start`] registers a PENDING job and spawns its run.
//! - The run lists captures; a listing failure moves the job to ERROR.
//! - Captures are processed on a bounded worker pool. Per-capture failures
//!   only shrink the result set.
//! - Results are written to the store with a fresh expiry, then the job is
//!   COMPLETE. A failed write is recorded on the job, not turned into ERROR.
//!
//! ### Deduplication
//! - Captures sharing a content digest are fingerprinted once per process,
//!   through the shared [`DigestCache`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use wbdiff_core::simhash::encode_simhash;
use wbdiff_core::{AppConfig, CacheDb, DigestCache, Error, JobRegistry, url_key};

use crate::archive::{ArchiveSource, Capture};
use crate::extract::extract_features;

/// Progress is reported after every this many finished captures.
const PROGRESS_EVERY: usize = 10;

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Fingerprint width in bits (default: 256)
    pub simhash_size: usize,

    /// Captures in flight per job (default: 20)
    pub concurrency: usize,

    /// Result record lifetime in seconds (default: 86400)
    pub expire_secs: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for JobSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            simhash_size: config.simhash_size,
            concurrency: config.concurrency,
            expire_secs: config.expire_secs,
        }
    }
}

struct Shared {
    source: Arc<dyn ArchiveSource>,
    db: CacheDb,
    digests: DigestCache,
    jobs: JobRegistry,
    settings: JobSettings,
}

/// Starts jobs and owns their tasks.
pub struct Orchestrator {
    shared: Arc<Shared>,
    tasks: Mutex<JoinSet<()>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ArchiveSource>, db: CacheDb, digests: DigestCache, jobs: JobRegistry, settings: JobSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared { source, db, digests, jobs, settings }),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Register a PENDING job for `(url, year)` and run it in the background.
    ///
    /// Does not deduplicate; see [`Orchestrator::start_or_join`]. Must be
    /// called from within a tokio runtime.
    pub fn start(&self, url: &str, year: &str) -> String {
        let job = self.shared.jobs.create(url, year);
        self.spawn(job.id.clone(), url, year);
        job.id
    }

    /// Start a job for `(url, year)` unless one is already PENDING.
    ///
    /// Returns the job id and whether a new job was started.
    pub fn start_or_join(&self, url: &str, year: &str) -> (String, bool) {
        let (job, created) = self.shared.jobs.find_pending_or_create(url, year);
        if created {
            self.spawn(job.id.clone(), url, year);
        }
        (job.id, created)
    }

    fn spawn(&self, job_id: String, url: &str, year: &str) {
        tracing::info!(job_id = %job_id, url, year, "starting simhash job");

        let shared = self.shared.clone();
        let (url, year) = (url.to_string(), year.to_string());

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { run_job(shared, job_id, url, year).await });
    }

    /// Wait for every started job to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        tracing::info!(running = tasks.len(), "draining simhash jobs");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "simhash job task failed");
            }
        }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.shared.jobs
    }

    pub fn db(&self) -> &CacheDb {
        &self.shared.db
    }

}

async fn run_job(shared: Arc<Shared>, job_id: String, url: String, year: String) {
    let started = Instant::now();

    let captures = match shared.source.list_captures(&url, &year).await {
        Ok(captures) => captures,
        Err(e) => {
            tracing::warn!(job_id, url, year, error = %e, "cannot list captures");
            shared
                .jobs
                .fail(&job_id, format!("error while fetching captures for url {url} and year {year}, {e}"));
            return;
        }
    };

    let total = captures.len();
    let results = process_captures(&shared, &job_id, &url, captures).await;
    let known_digests = shared.digests.len().await;
    tracing::info!(
        job_id,
        url,
        year,
        total,
        fingerprints = results.len(),
        known_digests,
        "captures processed"
    );

    let persist_error = if results.is_empty() {
        None
    } else {
        match persist(&shared, &url, &results).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(job_id, url, error = %e, "cannot write simhashes");
                Some(e.to_string())
            }
        }
    };

    let info = match &persist_error {
        None => format!("Processed {total} captures."),
        Some(e) => format!("cannot write simhashes for url {url}, {e}"),
    };
    shared.jobs.complete(&job_id, info, persist_error);

    tracing::info!(job_id, url, year, elapsed_ms = started.elapsed().as_millis() as u64, "simhash job finished");
}

/// Fingerprint every capture with at most `concurrency` in flight.
async fn process_captures(
    shared: &Arc<Shared>, job_id: &str, url: &str, captures: Vec<Capture>,
) -> HashMap<String, String> {
    let total = captures.len();
    let semaphore = Arc::new(Semaphore::new(shared.settings.concurrency.max(1)));
    let finished = Arc::new(AtomicUsize::new(0));
    let mut workers = JoinSet::new();

    for capture in captures {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let shared = shared.clone();
        let finished = finished.clone();
        let job_id = job_id.to_string();
        let url = url.to_string();

        workers.spawn(async move {
            let _permit = permit;
            let simhash = process_capture(&shared, &url, &capture).await;

            let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
            if done % PROGRESS_EVERY == 0 {
                shared.jobs.set_info(&job_id, format!("Processed {done} out of {total} captures."));
            }
            simhash.map(|simhash| (capture.timestamp, simhash))
        });
    }

    let mut results = HashMap::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Some((timestamp, simhash))) => {
                results.insert(timestamp, simhash);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(job_id, url, error = %e, "capture worker failed"),
        }
    }
    results
}

/// Simhash of one capture, reusing the digest cache when possible.
async fn process_capture(shared: &Shared, url: &str, capture: &Capture) -> Option<String> {
    if let Some(simhash) = shared.digests.get(&capture.digest).await {
        tracing::debug!(digest = %capture.digest, timestamp = %capture.timestamp, "digest already seen");
        return Some(simhash);
    }

    let Some(body) = shared.source.download_capture(&capture.timestamp, url).await else {
        tracing::debug!(timestamp = %capture.timestamp, url, "no usable capture body");
        return None;
    };

    let features = extract_features(&body);
    if features.is_empty() {
        tracing::debug!(timestamp = %capture.timestamp, url, "capture has no features");
        return None;
    }

    let simhash = encode_simhash(&features, shared.settings.simhash_size);
    shared.digests.put(&capture.digest, &simhash).await;
    Some(simhash)
}

async fn persist(shared: &Shared, url: &str, results: &HashMap<String, String>) -> Result<(), Error> {
    let key = url_key(url);
    let written = shared.db.put_captures(&key, results).await?;
    let ttl = i64::try_from(shared.settings.expire_secs).unwrap_or(i64::MAX);
    shared.db.expire_captures(&key, ttl).await?;
    tracing::info!(url, key, written, "stored simhashes");
    Ok(())
}
