//! Request-scoped context propagation.
//!
//! Each inbound HTTP request is folded through an ordered list of
//! [`ContextExtractor`]s. Every stage may read the raw request parts and
//! add one piece of information (a bearer token, a verified identity) to the
//! accumulated [`RequestContext`]. Nothing is stored globally: the finished
//! context rides along in the request's extensions and is handed to tools
//! through [`ToolContext`](crate::traits::ToolContext).
//!
//! Extractors never fail. A missing or malformed header simply leaves the
//! context as it was; tools that need a credential check for it at the point
//! of use and report its absence as a tool-level error.

use axum::http::{header::AUTHORIZATION, request::Parts};
use std::sync::Arc;

use crate::identity::Identity;

const BEARER_PREFIX: &str = "Bearer ";

/// Typed values extracted from a single inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: Option<String>,
    identity: Option<Identity>,
}

impl RequestContext {
    /// Returns a copy of this context carrying `token`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns a copy of this context carrying `identity`.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

/// One stage of the context pipeline.
///
/// Implemented for any `Fn(RequestContext, &Parts) -> RequestContext`, so
/// plain functions such as [`bearer_token`] can be used directly.
pub trait ContextExtractor: Send + Sync {
    fn extract(&self, ctx: RequestContext, parts: &Parts) -> RequestContext;
}

impl<F> ContextExtractor for F
where
    F: Fn(RequestContext, &Parts) -> RequestContext + Send + Sync,
{
    fn extract(&self, ctx: RequestContext, parts: &Parts) -> RequestContext {
        self(ctx, parts)
    }
}

/// An ordered composition of extractors.
#[derive(Clone, Default)]
pub struct ContextPipeline {
    stages: Vec<Arc<dyn ContextExtractor>>,
}

impl ContextPipeline {
    /// Folds every stage, left to right, over an empty context.
    pub fn apply(&self, parts: &Parts) -> RequestContext {
        self.apply_to(RequestContext::default(), parts)
    }

    /// Folds every stage, left to right, over `initial`.
    pub fn apply_to(&self, initial: RequestContext, parts: &Parts) -> RequestContext {
        self.stages
            .iter()
            .fold(initial, |ctx, stage| stage.extract(ctx, parts))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for ContextPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// Combines extractors into a single pipeline that runs them in order.
pub fn combine(stages: Vec<Arc<dyn ContextExtractor>>) -> ContextPipeline {
    ContextPipeline { stages }
}

/// Stores the token from an `Authorization: Bearer <token>` header.
///
/// The prefix match is case-sensitive. Any other header shape, or no header
/// at all, leaves the context unchanged.
pub fn bearer_token(ctx: RequestContext, parts: &Parts) -> RequestContext {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return ctx;
    };
    let Ok(value) = value.to_str() else {
        tracing::debug!("authorization header is not valid UTF-8");
        return ctx;
    };
    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.is_empty() => ctx.with_token(token),
        _ => ctx,
    }
}
