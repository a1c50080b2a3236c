//! MCP JSON-RPC bridge.
//!
//! Adapts the [`ToolRegistry`] to the Model Context Protocol and serves it
//! over stdio, so MCP clients can launch the binary directly:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "free-for-dev": {
//!       "command": "ftc",
//!       "args": ["--config", "/path/to/ftc.toml", "serve", "mcp"]
//!     }
//!   }
//! }
//! ```
//!
//! Stdout carries protocol frames only; logs go to stderr.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Context;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};

use crate::tools::{validate_params, ToolContext, ToolRegistry};

/// Bridges the tool registry to MCP. Cheap to clone.
#[derive(Clone)]
pub struct McpBridge {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl McpBridge {
    pub fn new(tools: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { tools, ctx }
    }

    fn to_mcp_tool(tool: &dyn crate::tools::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        // Only refresh_data mutates state.
        let read_only = tool.name() != "refresh_data";

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(read_only)),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "free-for-dev".to_string(),
                title: Some("Free-tier service catalog".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Catalog of free-tier developer services from free-for.dev. \
                 Use semantic_search for typo-tolerant ranked search, search_services for \
                 plain filtering, get_service for details, and get_similar_services to \
                 find alternatives."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let params = validate_params(&tool.parameters_schema(), &params).map_err(|e| {
            McpError::new(ErrorCode::INVALID_PARAMS, e.to_string(), None)
        })?;

        let outcome = tool.execute(params, &self.ctx).await;
        Ok(to_call_result(&request.name, outcome))
    }
}

/// Render a tool outcome. Execution and serialization failures both become
/// error results carrying the message.
fn to_call_result(tool_name: &str, outcome: anyhow::Result<serde_json::Value>) -> CallToolResult {
    let text = outcome.and_then(|value| Ok(serde_json::to_string_pretty(&value)?));
    match text {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => {
            tracing::warn!(tool = tool_name, error = %e, "tool call failed");
            CallToolResult::error(vec![Content::text(e.to_string())])
        }
    }
}

/// Serve the registry over MCP on stdin/stdout until the client disconnects.
pub async fn run_stdio(tools: Arc<ToolRegistry>, ctx: ToolContext) -> anyhow::Result<()> {
    tracing::info!(tools = tools.len(), "MCP server listening on stdio");
    let service = McpBridge::new(tools, ctx)
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start MCP stdio transport")?;
    let reason = service.waiting().await?;
    tracing::info!(?reason, "MCP session ended");
    Ok(())
}
