//! job_status tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use wbdiff_core::{Error, Job, JobRegistry, QueryResult};

use super::json_output;

/// Parameters for the job_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusParams {
    /// Id returned by calculate_simhash.
    pub job_id: String,
}

/// Snapshot of one job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatus {
    pub job_id: String,
    pub url: String,
    pub year: String,
    /// PENDING, COMPLETE or ERROR.
    pub state: String,
    /// Progress or failure message.
    pub info: String,
    /// Run time in seconds, once finished.
    pub duration: Option<f64>,
    /// Set when results could not be written to the store.
    pub persist_error: Option<String>,
}

impl From<Job> for JobStatus {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            url: job.url,
            year: job.year,
            state: job.state.to_string(),
            info: job.info,
            duration: job.duration_secs,
            persist_error: job.persist_error,
        }
    }
}

/// Implementation of the job_status tool.
pub fn status_impl(jobs: &JobRegistry, params: JobStatusParams) -> Result<CallToolResult, McpError> {
    if params.job_id.is_empty() {
        return Err(Error::InvalidInput("job_id param is required".into()).into());
    }

    let result: QueryResult<JobStatus> = match jobs.get(&params.job_id) {
        Some(job) => QueryResult::Success { data: job.into() },
        None => {
            tracing::debug!(job_id = %params.job_id, "unknown job");
            QueryResult::NotFound
        }
    };

    Ok(json_output(&result))
}
