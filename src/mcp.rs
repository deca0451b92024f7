//! MCP JSON-RPC protocol bridge.
//!
//! Adapts one backend's [`ToolRegistry`] to an rmcp [`ServerHandler`] served
//! over Streamable HTTP. The [`RequestContext`] built by the context
//! pipeline middleware is recovered from the HTTP request parts that rmcp
//! attaches to every call.
//!
//! * A successful tool call becomes a success result holding one text item.
//! * Argument, credential and rejected-request failures become error
//!   results the agent can read.
//! * Everything else becomes a JSON-RPC internal error naming the tool.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::Value;

use crate::backends::Backend;
use crate::context::RequestContext;
use crate::traits::{ToolContext, ToolError, ToolRegistry};

/// Serves one backend's tools over MCP.
///
/// Cloned for every request (everything is behind `Arc`).
#[derive(Clone)]
pub struct McpBridge {
    name: String,
    title: String,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(backend: &Backend) -> Self {
        Self {
            name: backend.name.clone(),
            title: backend.title.clone(),
            tools: backend.tools.clone(),
        }
    }

    /// Convert a registered tool into an rmcp `Tool` descriptor.
    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, Value>> = match tool.parameters_schema() {
            Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(tool.read_only())),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    pub fn mcp_tools(&self) -> Vec<Tool> {
        self.tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect()
    }

    /// Runs tool `name` with `params` on behalf of the request described by
    /// `request`.
    pub async fn dispatch(
        &self,
        name: &str,
        params: Value,
        request: RequestContext,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", name),
                None,
            )
        })?;

        let ctx = ToolContext::new(request);
        match tool.execute(params, &ctx).await {
            Ok(value) => {
                let text = result_text(value).map_err(|e| internal_error(name, e.into()))?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) if e.is_tool_level() => {
                tracing::debug!(backend = %self.name, tool = name, error = %e, "tool reported error");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            Err(e) => Err(internal_error(name, e)),
        }
    }
}

/// Strings are sent verbatim; anything else as compact JSON.
fn result_text(value: Value) -> Result<String, serde_json::Error> {
    match value {
        Value::String(text) => Ok(text),
        other => serde_json::to_string(&other),
    }
}

fn internal_error(tool: &str, err: ToolError) -> McpError {
    let err = anyhow::Error::from(err);
    tracing::error!(tool, error = %format!("{:#}", err), "tool failed");
    McpError::internal_error(format!("{}: {:#}", tool, err), None)
}

/// Recovers the pipeline's context from the HTTP request behind an MCP call.
fn request_context(context: &rmcp::service::RequestContext<rmcp::RoleServer>) -> RequestContext {
    context
        .extensions
        .get::<axum::http::request::Parts>()
        .and_then(|parts| parts.extensions.get::<RequestContext>())
        .cloned()
        .unwrap_or_default()
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                title: Some(self.title.clone()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: None,
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(self.mcp_tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let params = request
            .arguments
            .map(Value::Object)
            .unwrap_or(Value::Object(serde_json::Map::new()));
        self.dispatch(&request.name, params, request_context(&context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_text() {
        assert_eq!(
            result_text(Value::String("[\n  1\n]".into())).unwrap(),
            "[\n  1\n]"
        );
        assert_eq!(
            result_text(serde_json::json!({ "name": "a" })).unwrap(),
            r#"{"name":"a"}"#
        );
    }

    #[test]
    fn test_internal_error_names_tool() {
        let err = internal_error(
            "fetch",
            ToolError::Backend(anyhow::anyhow!("timeout").context("get page")),
        );
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(err.message, "fetch: get page: timeout");
    }
}
