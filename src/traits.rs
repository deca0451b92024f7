//! Tool abstraction shared by every backend.
//!
//! A backend is exposed to agents as a [`ToolRegistry`]: a flat list of
//! [`Tool`] trait objects that the MCP bridge lists and dispatches to. The
//! document gateway, the SQLite tools and the identity echo all implement the
//! same trait.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ToolRegistry                 │
//! │  ┌────────────┐ ┌────────────┐ ┌───────────┐ │
//! │  │  Gateway   │ │   SQLite   │ │  whoami   │ │
//! │  │search/fetch│ │ read_query │ │           │ │
//! │  └────────────┘ └────────────┘ └───────────┘ │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!            McpBridge → Streamable HTTP
//! ```
//!
//! # Errors
//!
//! [`ToolError`] separates failures the calling agent can act on
//! (bad arguments, missing credentials, a rejected query) from failures of
//! the system itself (backend unreachable, result not serializable). The
//! former are reported back as tool results flagged as errors; the latter
//! propagate to the transport as protocol errors.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::identity::Identity;

// ═══════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════

/// Failure of a single tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A required argument is missing, has the wrong type, or is empty.
    #[error("{0}")]
    InvalidArgument(String),

    /// The request did not carry a credential the tool needs.
    #[error("{0}")]
    MissingCredential(String),

    /// The backend refused the request for a reason the caller can fix.
    #[error("{0}")]
    Rejected(String),

    /// The backend failed; carries call-site context.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),

    /// The tool produced a result that could not be encoded.
    #[error("encode result: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ToolError {
    /// Whether this failure is reported to the agent as an error result
    /// rather than raised as a protocol error.
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidArgument(_) | ToolError::MissingCredential(_) | ToolError::Rejected(_)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// An MCP tool that agents can discover and call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use toolhost::traits::{Tool, ToolContext, ToolError};
///
/// pub struct PingTool;
///
/// #[async_trait]
/// impl Tool for PingTool {
///     fn name(&self) -> &str { "ping" }
///     fn description(&self) -> &str { "Reply with pong" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
///         Ok(json!("pong"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's name, unique within its backend.
    fn name(&self) -> &str;

    /// Returns the description agents use to decide whether to call the tool.
    fn description(&self) -> &str;

    /// Whether the tool only reads. Defaults to `true`.
    fn read_only(&self) -> bool {
        true
    }

    /// Returns the JSON Schema for the tool's arguments.
    ///
    /// Must be an object schema with `properties` and optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Executes the tool.
    ///
    /// A [`Value::String`] result is sent to the agent as-is; any other value
    /// is sent as its JSON encoding.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Per-invocation context handed to [`Tool::execute`].
///
/// Wraps the [`RequestContext`] produced by the context pipeline for the
/// HTTP request that carried the tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    request: RequestContext,
}

impl ToolContext {
    pub fn new(request: RequestContext) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Returns the verified identity or a tool-level credential error.
    pub fn require_identity(&self) -> Result<&Identity, ToolError> {
        self.request.identity().ok_or_else(|| {
            ToolError::MissingCredential("no identity was passed in the request context".to_string())
        })
    }
}

/// Reads a required, non-empty string argument.
pub fn required_string<'a>(params: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    match params.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ToolError::InvalidArgument(format!(
            "Missing or empty '{}' argument",
            field
        ))),
    }
}

/// Reads an optional string argument, treating a missing field as empty.
pub fn optional_string<'a>(params: &'a Value, field: &str) -> &'a str {
    params.get(field).and_then(Value::as_str).unwrap_or("")
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Serializable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub read_only: bool,
    /// JSON Schema of the tool's arguments.
    pub parameters: Value,
}

/// The tools of one backend.
///
/// # Example
///
/// ```rust
/// use toolhost::traits::ToolRegistry;
///
/// let mut tools = ToolRegistry::new();
/// // tools.register(Box::new(MyTool::new()));
/// assert!(tools.is_empty());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Get all registered tools, in registration order.
    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Describe every registered tool.
    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                read_only: t.read_only(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_string() {
        let params = json!({ "query": "roadmap", "empty": "", "number": 3 });
        assert_eq!(required_string(&params, "query").unwrap(), "roadmap");

        for field in ["empty", "number", "absent"] {
            let err = required_string(&params, field).unwrap_err();
            assert!(err.is_tool_level());
            assert_eq!(err.to_string(), format!("Missing or empty '{}' argument", field));
        }
    }

    #[test]
    fn test_error_levels() {
        assert!(ToolError::MissingCredential("x".into()).is_tool_level());
        assert!(ToolError::Rejected("x".into()).is_tool_level());
        assert!(!ToolError::Backend(anyhow::anyhow!("boom")).is_tool_level());
    }
}
