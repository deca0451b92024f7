//! # toolhost CLI
//!
//! ## Usage
//!
//! ```bash
//! toolhost --config ./config/toolhost.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `toolhost serve` | Start the MCP HTTP server |
//! | `toolhost tools <backend>` | Print a backend's tools and their schemas |
//! | `toolhost call <backend> <tool>` | Invoke one tool locally and print the result |
//!
//! ## Examples
//!
//! ```bash
//! # Serve every configured backend
//! toolhost serve
//!
//! # Inspect the SQLite tools
//! toolhost tools sqlite
//!
//! # Fetch a Notion page with an integration token
//! toolhost call notion fetch --arg id=1f2e3d4c --token "$NOTION_TOKEN"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use toolhost::backends::{build_backends, default_factories};
use toolhost::config;
use toolhost::context::RequestContext;
use toolhost::server;
use toolhost::traits::ToolContext;

/// Serve document, relational and identity backends as MCP tools.
#[derive(Parser)]
#[command(name = "toolhost", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/toolhost.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server.
    ///
    /// Binds to `[server].bind` and mounts every configured backend at
    /// `/{backend}`.
    Serve,

    /// List the tools of one backend as JSON.
    Tools {
        /// Backend name (`notion`, `sqlite`, `whoami`).
        backend: String,
    },

    /// Call a tool directly, without the HTTP layer.
    Call {
        /// Backend name.
        backend: String,
        /// Tool name within the backend.
        tool: String,
        /// Tool argument as `key=value` (repeatable). Values are passed as strings.
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
        /// Bearer token forwarded to the backend.
        #[arg(long)]
        token: Option<String>,
    },
}

/// Parse a `key=value` pair for `--arg` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Tools { backend } => {
            let backends = build_backends(&cfg, &default_factories()).await?;
            let found = backends
                .iter()
                .find(|b| b.name == backend)
                .with_context(|| format!("backend '{}' is not configured", backend))?;
            println!("{}", serde_json::to_string_pretty(&found.tools.infos())?);
        }
        Commands::Call {
            backend,
            tool,
            args,
            token,
        } => {
            let backends = build_backends(&cfg, &default_factories()).await?;
            let found = backends
                .iter()
                .find(|b| b.name == backend)
                .with_context(|| format!("backend '{}' is not configured", backend))?;
            let target = found
                .tools
                .find(&tool)
                .with_context(|| format!("backend '{}' has no tool '{}'", backend, tool))?;

            let params: Map<String, Value> =
                args.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
            let mut request = RequestContext::default();
            if let Some(token) = token {
                request = request.with_token(token);
            }

            let result = target
                .execute(Value::Object(params), &ToolContext::new(request))
                .await
                .with_context(|| format!("{} failed", tool))?;
            match result {
                Value::String(text) => println!("{}", text),
                other => println!("{}", serde_json::to_string_pretty(&other)?),
            }
            for b in &backends {
                b.close().await;
            }
        }
    }

    Ok(())
}
