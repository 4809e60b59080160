//! get_simhash tool implementation.
//!
//! Reads stored simhashes for one capture timestamp or a whole year, with
//! optional paging and compression.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use wbdiff_client::validate_target;
use wbdiff_core::query::{compress_captures, timestamp_simhash, year_simhash};
use wbdiff_core::{CacheDb, CaptureResult, CompressedCaptures, Error, JobRegistry, JobState, QueryResult};

use super::json_output;

/// Parameters for the get_simhash tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetSimhashParams {
    /// The URL whose simhashes are requested.
    pub url: String,

    /// Exact capture timestamp (YYYYMMDDHHMMSS). Takes precedence over `year`.
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Four-digit year; required when no timestamp is given.
    #[serde(default)]
    pub year: Option<String>,

    /// 1-based page of year results, when paging is configured.
    #[serde(default)]
    pub page: Option<usize>,

    /// Group year results by date and send each distinct simhash once.
    #[serde(default)]
    pub compress: bool,
}

/// Query payload: one capture, a list, or the compressed form.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SimhashData {
    Capture(CaptureResult),
    Captures(Vec<CaptureResult>),
    Compressed(CompressedCaptures),
}

/// Output from the get_simhash tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetSimhashOutput {
    /// Query outcome.
    pub result: QueryResult<SimhashData>,

    /// Number of captures in this response.
    pub total_captures: usize,

    /// State of the latest job for this URL and year, `PENDING` if none is known.
    pub status: String,
}

/// Implementation of the get_simhash tool.
pub async fn get_impl(
    db: &CacheDb, jobs: &JobRegistry, per_page: Option<usize>, params: GetSimhashParams,
) -> Result<CallToolResult, McpError> {
    validate_target(&params.url)?;

    let (year, result) = match params.timestamp.as_deref().filter(|t| !t.is_empty()) {
        Some(timestamp) => {
            let year = timestamp.get(..4).unwrap_or(timestamp).to_string();
            let result = timestamp_simhash(db, &params.url, timestamp)
                .await
                .map(SimhashData::Capture);
            (year, result)
        }
        None => {
            let year = params
                .year
                .clone()
                .filter(|y| !y.is_empty())
                .ok_or_else(|| Error::InvalidInput("year param is required".into()))?;
            let result = year_simhash(db, &params.url, &year, params.page, per_page)
                .await
                .map(|captures| {
                    if params.compress {
                        SimhashData::Compressed(compress_captures(&captures))
                    } else {
                        SimhashData::Captures(captures)
                    }
                });
            (year, result)
        }
    };

    if let Err(e @ Error::InvalidInput(_)) = result {
        return Err(e.into());
    }

    let total_captures = match &result {
        Ok(SimhashData::Capture(_)) => 1,
        Ok(SimhashData::Captures(captures)) => captures.len(),
        Ok(SimhashData::Compressed(compressed)) => compressed
            .captures
            .iter()
            .flat_map(|y| &y.months)
            .flat_map(|m| &m.days)
            .map(|d| d.captures.len())
            .sum(),
        Err(_) => 0,
    };

    let status = jobs
        .find(&params.url, &year)
        .map(|job| job.state)
        .unwrap_or(JobState::Pending)
        .to_string();

    let output = GetSimhashOutput { result: result.into(), total_captures, status };
    Ok(json_output(&output))
}
