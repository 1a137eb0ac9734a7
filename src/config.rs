use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::trace;

use crate::monitors::process::ProcessDescriptor;
use crate::notify::Audience;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (health reports older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./lifeguard.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Recipient for admin-audience e-mail
    pub admin_email: Option<String>,

    /// Storage configuration (optional - defaults to SQLite)
    #[serde(default)]
    pub storage: StorageConfig,

    pub api: Option<ApiConfig>,
}

/// Where and how the web server is probed
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    /// Explicit internal / override URL, tried first
    pub internal_url: Option<String>,

    pub public_url: Option<String>,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Port of the local server, used for loopback targets and the port check
    #[serde(default = "default_probe_port")]
    pub port: u16,

    #[serde(default = "default_loopback_hosts")]
    pub loopback_hosts: Vec<String>,

    #[serde(default = "default_loopback_scheme")]
    pub loopback_scheme: String,

    /// Server process expected to run on this host
    pub process: Option<ProcessDescriptor>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            internal_url: None,
            public_url: None,
            health_path: default_health_path(),
            port: default_probe_port(),
            loopback_hosts: default_loopback_hosts(),
            loopback_scheme: default_loopback_scheme(),
            process: None,
        }
    }
}

impl ProbeConfig {
    /// Host used for the port-liveness check
    pub fn port_host(&self) -> &str {
        self.loopback_hosts
            .first()
            .map(String::as_str)
            .unwrap_or("127.0.0.1")
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_probe_port() -> u16 {
    8000
}

fn default_loopback_hosts() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "localhost".to_string()]
}

fn default_loopback_scheme() -> String {
    "http".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelConfig {
    Discord(DiscordConfig),
    Webhook(WebhookConfig),
    Email(EmailConfig),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DiscordConfig {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EmailConfig {
    /// Relay endpoint accepting `{from, to, subject, text}`
    pub url: String,
    pub from: String,
    pub token: Option<String>,
    #[serde(default = "default_email_audience")]
    pub audience: Audience,
}

fn default_email_audience() -> Audience {
    Audience::EndUser
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind: SocketAddr,

    /// Bearer token; `LIFEGUARD_API_TOKEN` takes precedence
    pub token: Option<String>,

    #[serde(default)]
    pub cors: bool,
}

fn default_api_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("could not read {path}"))?;
    serde_json::from_str(&file_content)
        .context("Invalid configuration file provided!")
        .inspect(|config| trace!("loaded config: {config:?}"))
}
