//! Best-effort, multi-channel notification dispatch
//!
//! A [`Notifier`] fans a [`Notification`] out to every configured
//! [`NotificationChannel`] serving the notification's audience. Channels are
//! attempted concurrently and independently: one failing channel is recorded
//! in the [`DispatchReport`] and never blocks or undoes the others.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::config::ChannelConfig;

pub mod discord;
pub mod webhook;

pub use discord::DiscordChannel;
pub use webhook::{EmailRelayChannel, WebhookChannel};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("channel answered with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("no recipient for channel '{0}'")]
    MissingRecipient(String),
}

/// Who a notification is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Admin,
    EndUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Resolved,
}

impl Severity {
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Critical => "🔴",
            Severity::Resolved => "✅",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub audience: Audience,

    /// Addressee for channels that need one (e-mail)
    pub recipient: Option<String>,

    pub subject: String,
    pub body: String,
    pub severity: Severity,
}

impl Notification {
    pub fn admin(severity: Severity, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            audience: Audience::Admin,
            recipient: None,
            subject: subject.into(),
            body: body.into(),
            severity,
        }
    }

    pub fn end_user(
        recipient: impl Into<String>,
        severity: Severity,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            audience: Audience::EndUser,
            recipient: Some(recipient.into()),
            subject: subject.into(),
            body: body.into(),
            severity,
        }
    }

    pub fn with_recipient(mut self, recipient: Option<String>) -> Self {
        if recipient.is_some() {
            self.recipient = recipient;
        }
        self
    }
}

/// One outbound transport (chat webhook, e-mail relay, ...)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short identifier used in logs and dispatch reports
    fn name(&self) -> &str;

    fn audience(&self) -> Audience;

    /// Whether the channel can only deliver to an explicit recipient
    fn requires_recipient(&self) -> bool {
        false
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFailure {
    pub channel: String,
    pub error: String,
}

/// Per-channel outcome of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<ChannelFailure>,

    /// Channels not attempted for lack of a recipient
    pub skipped: Vec<String>,
}

impl DispatchReport {
    /// Merge another report into this one
    pub fn extend(&mut self, other: DispatchReport) {
        self.delivered.extend(other.delivered);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Fan-out over all configured channels
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Build channels from the hub configuration, sharing one HTTP client
    pub fn from_config(configs: &[ChannelConfig], client: reqwest::Client) -> Self {
        let channels = configs
            .iter()
            .map(|config| -> Arc<dyn NotificationChannel> {
                match config {
                    ChannelConfig::Discord(discord) => {
                        Arc::new(DiscordChannel::new(client.clone(), discord.clone()))
                    }
                    ChannelConfig::Webhook(webhook) => {
                        Arc::new(WebhookChannel::new(client.clone(), webhook.clone()))
                    }
                    ChannelConfig::Email(email) => {
                        Arc::new(EmailRelayChannel::new(client.clone(), email.clone()))
                    }
                }
            })
            .collect();

        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[instrument(skip_all, fields(subject = %notification.subject, audience = ?notification.audience))]
    pub async fn dispatch(&self, notification: &Notification) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut targets = Vec::new();

        for channel in self
            .channels
            .iter()
            .filter(|c| c.audience() == notification.audience)
        {
            if channel.requires_recipient() && notification.recipient.is_none() {
                debug!("skipping channel '{}': no recipient", channel.name());
                report.skipped.push(channel.name().to_string());
                continue;
            }
            targets.push(channel.clone());
        }

        let results = join_all(targets.iter().map(|channel| async move {
            (channel.name().to_string(), channel.send(notification).await)
        }))
        .await;

        for (name, result) in results {
            match result {
                Ok(()) => {
                    info!("delivered '{}' via {name}", notification.subject);
                    report.delivered.push(name);
                }
                Err(e) => {
                    error!("channel {name} failed to deliver '{}': {e}", notification.subject);
                    report.failed.push(ChannelFailure {
                        channel: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
