use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Audience, Notification, NotificationChannel, NotifyError, Severity};
use crate::config::DiscordConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 15158332, // Red
        Severity::Warning => 15105570,  // Orange
        Severity::Resolved => 3066993,  // Green
        Severity::Info => 5793266,      // Light blue
    }
}

/// Admin chat channel posting embeds to a Discord webhook
#[derive(Debug, Clone)]
pub struct DiscordChannel {
    client: Client,
    config: DiscordConfig,
}

impl DiscordChannel {
    pub fn new(client: Client, config: DiscordConfig) -> Self {
        Self { client, config }
    }

    pub fn build_message(&self, notification: &Notification) -> Message {
        let embed = Embed {
            title: Some(format!(
                "{} {}",
                notification.severity.emoji(),
                notification.subject
            )),
            description: Some(notification.body.clone()),
            color: Some(severity_color(notification.severity)),
            fields: notification
                .recipient
                .iter()
                .map(|recipient| EmbedField {
                    name: "Recipient".to_string(),
                    value: recipient.clone(),
                    inline: true,
                })
                .collect(),
            footer: Some(EmbedFooter {
                text: "lifeguard".to_string(),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        };

        let mut builder = MessageBuilder::new().add_embed(embed);

        // only ping for things that need attention
        let needs_attention = matches!(
            notification.severity,
            Severity::Critical | Severity::Warning
        );
        if let Some(user_id) = self.config.user_id.as_ref().filter(|_| needs_attention) {
            builder = builder.content(format!(
                "{} {} <@{user_id}>",
                notification.severity.emoji(),
                notification.subject
            ));
        }

        builder.build()
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn audience(&self) -> Audience {
        Audience::Admin
    }

    #[instrument(skip_all)]
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification);
        let response = self
            .client
            .post(&self.config.url)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Successfully sent Discord message");
        Ok(())
    }
}
