//! calculate_simhash tool implementation.
//!
//! Starts a background simhash job for a URL and year, unless one is
//! already running.

use std::time::Duration;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use wbdiff_client::{Orchestrator, validate_target, validate_year};
use wbdiff_core::JobState;

use super::json_output;

/// Parameters for the calculate_simhash tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CalculateSimhashParams {
    /// The URL whose captures should be fingerprinted.
    pub url: String,

    /// Four-digit capture year.
    pub year: String,
}

/// Output from the calculate_simhash tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CalculateSimhashOutput {
    /// `started` for a new job, `PENDING` when one was already running.
    pub status: String,

    /// Id of the started or running job.
    pub job_id: String,
}

/// Implementation of the calculate_simhash tool.
pub fn calculate_impl(
    orchestrator: &Orchestrator, retention: Duration, params: CalculateSimhashParams,
) -> Result<CallToolResult, McpError> {
    validate_target(&params.url)?;
    validate_year(&params.year)?;

    let pruned = orchestrator.jobs().prune_finished(retention);
    if pruned > 0 {
        tracing::debug!(pruned, "pruned finished jobs");
    }

    let output = match orchestrator.start_or_join(&params.url, &params.year) {
        (job_id, true) => CalculateSimhashOutput { status: "started".into(), job_id },
        (job_id, false) => CalculateSimhashOutput { status: JobState::Pending.to_string(), job_id },
    };

    Ok(json_output(&output))
}
