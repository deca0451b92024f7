//! The document provider contract.
//!
//! A [`Provider`] is what a document backend must implement to be served
//! through the `search` / `fetch` tool pair built by [`crate::gateway`].
//! Providers are constructed once at startup and shared by every request;
//! the caller's credential arrives with each call in the [`RequestContext`].

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::models::Document;

/// Failure of a provider operation.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Backend-agnostic document capability set.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable description of the search syntax, used verbatim as the
    /// `search` tool's description.
    fn search_syntax(&self) -> &str;

    /// Runs one backend query and maps each mappable result to a document,
    /// preserving backend order. An empty query is rejected without
    /// contacting the backend.
    async fn search(&self, ctx: &RequestContext, query: &str) -> Result<Vec<Document>, ProviderError>;

    /// Fetches exactly one document by its backend id.
    async fn fetch(&self, ctx: &RequestContext, id: &str) -> Result<Document, ProviderError>;
}
