//! Backend assembly.
//!
//! A [`Backend`] is one named tool set served at `/{name}`. Backends are
//! built at startup by the [`BackendFactory`] list passed to the server;
//! each factory decides from the config whether its backend is enabled.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::provider_notion::NotionFactory;
use crate::sqlite_tools::SqliteFactory;
use crate::traits::ToolRegistry;
use crate::whoami::WhoamiFactory;

/// A named, ready-to-serve tool set.
#[derive(Clone)]
pub struct Backend {
    pub name: String,
    /// Human-readable name reported to MCP clients.
    pub title: String,
    pub tools: Arc<ToolRegistry>,
    database: Option<SqlitePool>,
}

impl Backend {
    pub fn new(name: impl Into<String>, title: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            tools: Arc::new(tools),
            database: None,
        }
    }

    /// Attaches a pool that is closed when the server shuts down.
    pub fn with_database(mut self, pool: SqlitePool) -> Self {
        self.database = Some(pool);
        self
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.database {
            tracing::info!(backend = %self.name, "closing database");
            pool.close().await;
        }
    }
}

/// Builds one kind of backend from configuration.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// URL path segment the backend is served under.
    fn name(&self) -> &'static str;

    /// Returns `None` when the backend is not enabled in `config`.
    async fn build(&self, config: &Config) -> Result<Option<Backend>>;
}

/// Every backend this binary knows how to serve.
pub fn default_factories() -> Vec<Box<dyn BackendFactory>> {
    vec![
        Box::new(NotionFactory),
        Box::new(SqliteFactory),
        Box::new(WhoamiFactory),
    ]
}

/// Runs every factory and collects the enabled backends in factory order.
pub async fn build_backends(
    config: &Config,
    factories: &[Box<dyn BackendFactory>],
) -> Result<Vec<Backend>> {
    let mut seen = HashSet::new();
    let mut backends = Vec::new();
    for factory in factories {
        if !seen.insert(factory.name()) {
            anyhow::bail!("duplicate backend name: {}", factory.name());
        }
        let built = factory
            .build(config)
            .await
            .with_context(|| format!("Failed to start backend '{}'", factory.name()))?;
        match built {
            Some(backend) => {
                tracing::info!(
                    backend = %backend.name,
                    tools = backend.tools.len(),
                    "backend enabled"
                );
                backends.push(backend);
            }
            None => tracing::debug!(backend = factory.name(), "backend not configured"),
        }
    }
    Ok(backends)
}
