use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::identity::DEFAULT_ASSERTION_HEADER;
use crate::notion_api::{DEFAULT_API_BASE, DEFAULT_NOTION_VERSION};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
    #[serde(default)]
    pub backends: BackendsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Trust anchor for signed identity assertions. Exactly one of
/// `shared_secret`, `jwks_path` and `jwks_url` must be set.
#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "default_assertion_header")]
    pub header: String,
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub jwks_path: Option<PathBuf>,
    #[serde(default)]
    pub shared_secret: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Vec<String>,
}

fn default_assertion_header() -> String {
    DEFAULT_ASSERTION_HEADER.to_string()
}

/// A backend is enabled by the presence of its section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackendsConfig {
    pub notion: Option<NotionConfig>,
    pub sqlite: Option<SqliteConfig>,
    pub whoami: Option<WhoamiConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_notion_version")]
    pub notion_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            notion_version: default_notion_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_notion_version() -> String {
    DEFAULT_NOTION_VERSION.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SqliteConfig {
    pub db_file: PathBuf,
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,
}

fn default_max_result_bytes() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WhoamiConfig {}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parses and validates a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if let Some(identity) = &config.identity {
        let anchors = [
            identity.shared_secret.is_some(),
            identity.jwks_path.is_some(),
            identity.jwks_url.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if anchors != 1 {
            anyhow::bail!(
                "identity requires exactly one of shared_secret, jwks_path or jwks_url (found {})",
                anchors
            );
        }
        if identity.header.trim().is_empty() {
            anyhow::bail!("identity.header must not be empty");
        }
    }

    if let Some(notion) = &config.backends.notion {
        if notion.timeout_secs == 0 {
            anyhow::bail!("backends.notion.timeout_secs must be > 0");
        }
    }

    if let Some(sqlite) = &config.backends.sqlite {
        if sqlite.db_file.as_os_str().is_empty() {
            anyhow::bail!("backends.sqlite.db_file must not be empty");
        }
        if sqlite.max_result_bytes == 0 {
            anyhow::bail!("backends.sqlite.max_result_bytes must be > 0");
        }
    }

    Ok(config)
}
