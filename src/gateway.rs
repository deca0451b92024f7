//! Tool gateway: turns a [`Provider`] into the `search` / `fetch` tool pair.
//!
//! Argument problems never reach the provider; they come back to the agent
//! as error results. Provider credential and argument errors are reported
//! the same way. Backend failures are wrapped with the operation name and
//! raised to the transport.

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::Document;
use crate::provider::{Provider, ProviderError};
use crate::traits::{required_string, Tool, ToolContext, ToolError, ToolRegistry};

pub const SEARCH_TOOL: &str = "search";
pub const FETCH_TOOL: &str = "fetch";

const FETCH_DESCRIPTION: &str = "Fetch a document by ID";

/// Builds the two-tool registry for `provider`.
pub fn provider_tools(provider: Arc<dyn Provider>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchTool::new(provider.clone())));
    registry.register(Box::new(FetchTool::new(provider)));
    registry
}

#[derive(Serialize)]
struct SearchResults {
    results: Vec<Document>,
}

fn map_provider_error(operation: &str, err: ProviderError) -> ToolError {
    match err {
        ProviderError::InvalidArgument(msg) => ToolError::InvalidArgument(msg),
        ProviderError::MissingCredential(what) => {
            ToolError::MissingCredential(format!("{}: missing credential: {}", operation, what))
        }
        ProviderError::NotFound(what) => {
            ToolError::Backend(anyhow!("{}: not found: {}", operation, what))
        }
        ProviderError::Backend(e) => ToolError::Backend(e.context(operation.to_string())),
    }
}

fn string_schema(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            field: { "type": "string", "description": description }
        },
        "required": [field]
    })
}

/// `search(query)` over a provider.
pub struct SearchTool {
    provider: Arc<dyn Provider>,
}

impl SearchTool {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    fn description(&self) -> &str {
        self.provider.search_syntax()
    }

    fn parameters_schema(&self) -> Value {
        string_schema("query", "The search query to execute")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let query = required_string(&params, "query")?;
        let results = self
            .provider
            .search(ctx.request(), query)
            .await
            .map_err(|e| map_provider_error(SEARCH_TOOL, e))?;
        tracing::debug!(query, count = results.len(), "search complete");
        Ok(serde_json::to_value(SearchResults { results })?)
    }
}

/// `fetch(id)` over a provider.
pub struct FetchTool {
    provider: Arc<dyn Provider>,
}

impl FetchTool {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        FETCH_TOOL
    }

    fn description(&self) -> &str {
        FETCH_DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        string_schema("id", "The ID of the document to fetch")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let id = required_string(&params, "id")?;
        let document = self
            .provider
            .fetch(ctx.request(), id)
            .await
            .map_err(|e| map_provider_error(FETCH_TOOL, e))?;
        Ok(serde_json::to_value(document)?)
    }
}
