//! Generic JSON webhook and transactional e-mail relay channels

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde_json::json;
use tracing::{debug, instrument};

use super::{Audience, Notification, NotificationChannel, NotifyError};
use crate::config::{EmailConfig, WebhookConfig};

async fn check_response(response: Response) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Posts `{subject, message, severity, recipient, timestamp}` to a URL
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: Client,
    config: WebhookConfig,
}

impl WebhookChannel {
    pub fn new(client: Client, config: WebhookConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn audience(&self) -> Audience {
        Audience::Admin
    }

    #[instrument(skip_all)]
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = json!({
            "subject": notification.subject,
            "message": format!("{} **{}**: {}", notification.severity.emoji(), notification.subject, notification.body),
            "severity": notification.severity,
            "recipient": notification.recipient,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self.client.post(&self.config.url).json(&payload).send().await?;
        check_response(response).await?;

        debug!("Successfully sent webhook alert");
        Ok(())
    }
}

/// Hands mails to an HTTP mail relay (transactional e-mail API)
#[derive(Debug, Clone)]
pub struct EmailRelayChannel {
    client: Client,
    config: EmailConfig,
}

impl EmailRelayChannel {
    pub fn new(client: Client, config: EmailConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for EmailRelayChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn audience(&self) -> Audience {
        self.config.audience
    }

    fn requires_recipient(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(recipient = ?notification.recipient))]
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let Some(recipient) = &notification.recipient else {
            return Err(NotifyError::MissingRecipient(self.name().to_string()));
        };

        let payload = json!({
            "from": self.config.from,
            "to": recipient,
            "subject": notification.subject,
            "text": notification.body,
        });

        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        check_response(request.send().await?).await?;

        debug!("Successfully relayed e-mail");
        Ok(())
    }
}
