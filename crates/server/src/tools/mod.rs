//! MCP tool implementations.
//!
//! This module contains all tools exposed by the wbdiff server.

pub mod calculate_simhash;
pub mod get_simhash;
pub mod job_status;

pub use calculate_simhash::{CalculateSimhashOutput, CalculateSimhashParams};
pub use get_simhash::{GetSimhashOutput, GetSimhashParams};
pub use job_status::{JobStatus, JobStatusParams};

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// Wrap a tool output as pretty JSON text.
fn json_output<T: Serialize>(output: &T) -> CallToolResult {
    CallToolResult::success(vec![Content::text(serde_json::to_string_pretty(output).unwrap_or_default())])
}
