//! Simhash calculation jobs and their in-memory registry.
//!
//! A job is created PENDING when a calculation is requested, receives
//! advisory progress updates while its captures are processed, and moves
//! exactly once to COMPLETE or ERROR. Jobs are never persisted; the registry
//! keeps them until they are pruned or the process exits.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Complete,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Complete => "COMPLETE",
            JobState::Error => "ERROR",
        }
    }

    /// COMPLETE and ERROR are final.
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobState::Pending)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one calculation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub url: String,
    pub year: String,
    pub state: JobState,
    /// Human-readable progress or failure message.
    pub info: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock run time in seconds, set once finished.
    pub duration_secs: Option<f64>,
    /// Set when results were computed but could not be written to the store.
    pub persist_error: Option<String>,
}

impl Job {
    fn new(url: &str, year: &str) -> Self {
        Self {
            id: new_job_id(),
            url: url.to_string(),
            year: year.to_string(),
            state: JobState::Pending,
            info: format!("Fetching {url} captures for year {year}"),
            started_at: Utc::now(),
            finished_at: None,
            duration_secs: None,
            persist_error: None,
        }
    }

    fn finish(&mut self, state: JobState, info: String) {
        let now = Utc::now();
        self.state = state;
        self.info = info;
        self.finished_at = Some(now);
        self.duration_secs = Some((now - self.started_at).num_milliseconds() as f64 / 1000.0);
    }
}

/// Random 128-bit job id as 32 lowercase hex characters.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Shared registry of jobs, keyed by id.
///
/// Each job sits behind a watch channel so callers can poll a snapshot or
/// await completion.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, watch::Sender<Job>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new PENDING job for `(url, year)`.
    pub fn create(&self, url: &str, year: &str) -> Job {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        insert_new(&mut jobs, url, year)
    }

    /// Return the PENDING job for `(url, year)`, or register a new one.
    ///
    /// The lookup and the insert happen under one write lock, so concurrent
    /// callers agree on a single pending job. The flag is true when the job
    /// was created by this call.
    pub fn find_pending_or_create(&self, url: &str, year: &str) -> (Job, bool) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let pending = jobs
            .values()
            .map(|tx| tx.borrow().clone())
            .filter(|job| job.url == url && job.year == year && job.state == JobState::Pending)
            .max_by_key(|job| job.started_at);

        match pending {
            Some(job) => (job, false),
            None => (insert_new(&mut jobs, url, year), true),
        }
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(|tx| tx.borrow().clone())
    }

    /// Most recently started job for `(url, year)`, in any state.
    pub fn find(&self, url: &str, year: &str) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.values()
            .map(|tx| tx.borrow().clone())
            .filter(|job| job.url == url && job.year == year)
            .max_by_key(|job| job.started_at)
    }

    /// Apply `f` to a job. Returns false if the id is unknown.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut Job)) -> bool {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(id) {
            Some(tx) => {
                tx.send_modify(f);
                true
            }
            None => false,
        }
    }

    /// Replace the progress message of a pending job.
    pub fn set_info(&self, id: &str, info: impl Into<String>) {
        let info = info.into();
        self.update(id, |job| {
            if !job.state.is_finished() {
                job.info = info;
            }
        });
    }

    /// Move a pending job to COMPLETE.
    pub fn complete(&self, id: &str, info: impl Into<String>, persist_error: Option<String>) {
        let info = info.into();
        self.update(id, |job| {
            if !job.state.is_finished() {
                job.persist_error = persist_error;
                job.finish(JobState::Complete, info);
            }
        });
    }

    /// Move a pending job to ERROR.
    pub fn fail(&self, id: &str, info: impl Into<String>) {
        let info = info.into();
        self.update(id, |job| {
            if !job.state.is_finished() {
                job.finish(JobState::Error, info);
            }
        });
    }

    pub fn subscribe(&self, id: &str) -> Option<watch::Receiver<Job>> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(watch::Sender::subscribe)
    }

    /// Wait until the job is COMPLETE or ERROR and return its final snapshot.
    ///
    /// Returns `None` for an unknown id.
    pub async fn wait(&self, id: &str) -> Option<Job> {
        let mut rx = self.subscribe(id)?;
        let waited = rx.wait_for(|job| job.state.is_finished()).await.map(|job| job.clone());
        match waited {
            Ok(job) => Some(job),
            Err(_) => Some(rx.borrow().clone()),
        }
    }

    /// Drop finished jobs that ended more than `older_than` ago.
    ///
    /// Returns the number of jobs removed.
    pub fn prune_finished(&self, older_than: std::time::Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, tx| {
            let job = tx.borrow();
            !matches!(job.finished_at, Some(at) if at < cutoff)
        });
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_new(jobs: &mut HashMap<String, watch::Sender<Job>>, url: &str, year: &str) -> Job {
    let job = Job::new(url, year);
    let (tx, _) = watch::channel(job.clone());
    jobs.insert(job.id.clone(), tx);
    job
}
