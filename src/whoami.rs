//! Identity echo backend.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::backends::{Backend, BackendFactory};
use crate::config::Config;
use crate::traits::{Tool, ToolContext, ToolError, ToolRegistry};

pub const BACKEND_NAME: &str = "whoami";

#[derive(Serialize)]
struct Caller<'a> {
    name: &'a str,
    email: &'a str,
}

/// Returns the name and email of the verified caller.
pub struct WhoamiTool;

#[async_trait]
impl Tool for WhoamiTool {
    fn name(&self) -> &str {
        "whoami"
    }

    fn description(&self) -> &str {
        "Returns the identity of the user making the request"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let identity = ctx.require_identity()?;
        Ok(serde_json::to_value(Caller {
            name: &identity.name,
            email: &identity.email,
        })?)
    }
}

pub struct WhoamiFactory;

#[async_trait]
impl BackendFactory for WhoamiFactory {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn build(&self, config: &Config) -> anyhow::Result<Option<Backend>> {
        if config.backends.whoami.is_none() {
            return Ok(None);
        }
        if config.identity.is_none() {
            tracing::warn!("whoami is enabled without [identity]; every call will fail");
        }
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(WhoamiTool));
        Ok(Some(Backend::new(BACKEND_NAME, "Who am I", tools)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::identity::Identity;

    #[tokio::test]
    async fn test_whoami_echoes_identity() {
        let identity = Identity {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            sub: "user-1".to_string(),
            ..Identity::default()
        };
        let ctx = ToolContext::new(RequestContext::default().with_identity(identity));
        let out = WhoamiTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(out, json!({ "name": "Ada Lovelace", "email": "ada@example.com" }));
    }

    #[tokio::test]
    async fn test_whoami_without_identity() {
        let err = WhoamiTool
            .execute(json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.is_tool_level());
        assert_eq!(
            err.to_string(),
            "no identity was passed in the request context"
        );
    }
}
