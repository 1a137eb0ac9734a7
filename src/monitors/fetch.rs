//! HTTP GET capability used by the health probe

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{instrument, trace};

/// Result of one GET, never an error: failures are described in `error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// HTTP status, if a response arrived at all
    pub status_code: Option<u16>,

    /// Time until the response headers arrived (or the request failed)
    pub latency: Duration,

    /// Network / TLS / timeout description
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code.is_some_and(|code| (200..300).contains(&code))
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchOutcome;
}

/// reqwest-backed fetcher, one client reused across all attempts
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lifeguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchOutcome {
        let start = Instant::now();
        let result = self.client.get(url).timeout(timeout).send().await;
        let latency = start.elapsed();

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                trace!("{url} answered {status_code} in {}ms", latency.as_millis());
                FetchOutcome {
                    status_code: Some(status_code),
                    latency,
                    error: None,
                }
            }
            Err(e) => FetchOutcome {
                status_code: e.status().map(|s| s.as_u16()),
                latency,
                error: Some(describe_error(&e, timeout)),
            },
        }
    }
}

/// Flatten a reqwest error and its sources into one line
///
/// reqwest's own Display hides the cause (certificate mismatch, refused
/// connection, ...), which is exactly what the attempt record needs.
fn describe_error(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        return format!("timed out after {}ms", timeout.as_millis());
    }

    let mut message = if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };

    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }

    message
}
