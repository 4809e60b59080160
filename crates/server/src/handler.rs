//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;
use std::time::Duration;

use crate::tools::{
    CalculateSimhashParams, GetSimhashParams, JobStatusParams, calculate_simhash::calculate_impl,
    get_simhash::get_impl, job_status::status_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use wbdiff_client::Orchestrator;
use wbdiff_core::AppConfig;

/// The main MCP server handler for wbdiff.
#[derive(Clone)]
pub struct WbdiffServer {
    tool_router: ToolRouter<Self>,
    orchestrator: Arc<Orchestrator>,
    job_retention: Duration,
    snapshots_per_page: Option<usize>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl WbdiffServer {
    /// Create a new server handler.
    pub fn new(orchestrator: Arc<Orchestrator>, config: &AppConfig) -> Self {
        Self {
            tool_router: Self::tool_router(),
            orchestrator,
            job_retention: config.job_retention(),
            snapshots_per_page: config.snapshots_per_page,
        }
    }

    /// Start a simhash calculation for every capture of a URL in a year.
    #[tool(
        description = "Start computing SimHash fingerprints for all Wayback Machine captures of a URL in a given year. Returns a job id; an already running job for the same URL and year is reported instead of starting a new one."
    )]
    async fn calculate_simhash(&self, params: Parameters<CalculateSimhashParams>) -> Result<CallToolResult, McpError> {
        calculate_impl(&self.orchestrator, self.job_retention, params.0)
    }

    /// Read stored simhashes for a capture timestamp or a year.
    #[tool(
        description = "Get stored SimHash fingerprints of a URL, either for one capture timestamp (YYYYMMDDHHMMSS) or for a whole year, optionally paged and compressed."
    )]
    async fn get_simhash(&self, params: Parameters<GetSimhashParams>) -> Result<CallToolResult, McpError> {
        get_impl(self.orchestrator.db(), self.orchestrator.jobs(), self.snapshots_per_page, params.0).await
    }

    /// Report the state of a calculation job.
    #[tool(description = "Get the state, progress message and duration of a simhash calculation job.")]
    async fn job_status(&self, params: Parameters<JobStatusParams>) -> Result<CallToolResult, McpError> {
        status_impl(self.orchestrator.jobs(), params.0)
    }
}

impl ServerHandler for WbdiffServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "wbdiff".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
