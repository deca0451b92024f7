//! # toolhost
//!
//! Serves heterogeneous backends to AI agents as MCP tools over HTTP.
//!
//! Each backend (a Notion workspace, a SQLite database, the caller's own
//! identity) is mounted at its own path and exposes a small, fixed tool set.
//! Document backends implement [`provider::Provider`] and are turned into a
//! uniform `search` / `fetch` pair by the [`gateway`]. Per-request
//! credentials are pulled from the HTTP headers by the [`context`] pipeline
//! and forwarded to the backend on every call; the server itself stores
//! nothing.
//!
//! ## Architecture
//!
//! ```text
//!   HTTP request
//!        │
//!        ▼
//! ┌──────────────┐   bearer token, verified identity
//! │   context    │──────────────────────────────┐
//! │   pipeline   │                              │
//! └──────┬───────┘                              ▼
//!        │                              ┌──────────────┐
//!        ▼                              │RequestContext│
//! ┌──────────────┐   ┌─────────────┐    └──────┬───────┘
//! │  McpBridge   │──▶│ ToolRegistry│◀──────────┘
//! │  /{backend}  │   └──────┬──────┘
//! └──────────────┘          │
//!         ┌─────────────────┼─────────────────┐
//!         ▼                 ▼                 ▼
//!   ┌──────────┐     ┌────────────┐     ┌──────────┐
//!   │  Notion  │     │   SQLite   │     │  whoami  │
//!   │ provider │     │ read-only  │     │          │
//!   └──────────┘     └────────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! toolhost --config ./config/toolhost.toml serve
//! toolhost tools sqlite
//! toolhost call notion search --arg query=roadmap --token "$NOTION_TOKEN"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Request context pipeline |
//! | [`identity`] | Signed identity assertions |
//! | [`traits`] | Tool trait, errors and registry |
//! | [`models`] | The `Document` type |
//! | [`provider`] | Document provider contract |
//! | [`gateway`] | `search` / `fetch` tools over a provider |
//! | [`blocks`] | Notion pages and blocks |
//! | [`notion_api`] | Notion REST client |
//! | [`extract`] | Block tree to text |
//! | [`provider_notion`] | Notion provider |
//! | [`sqlite_tools`] | Read-only SQLite tools |
//! | [`whoami`] | Identity echo tool |
//! | [`backends`] | Backend factories |
//! | [`mcp`] | MCP protocol bridge |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |

pub mod backends;
pub mod blocks;
pub mod config;
pub mod context;
pub mod db;
pub mod extract;
pub mod gateway;
pub mod identity;
pub mod mcp;
pub mod models;
pub mod notion_api;
pub mod provider;
pub mod provider_notion;
pub mod server;
pub mod sqlite_tools;
pub mod traits;
pub mod whoami;
