use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use eyre::{Result, WrapErr, eyre};
use serde::Serialize;

use crate::{
    config::models::{MailerConfig, MailerKind},
    ports::mailer::{Mailer, MailerError},
};

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), MailerError> {
        tracing::info!(
            from = %self.sender,
            to = recipient,
            template,
            data = %data,
            "Notification queued for log delivery"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    to: &'a str,
    from: &'a str,
    template: &'a str,
    data: serde_json::Value,
}

/// Delivers notifications by POSTing them as JSON to a relay endpoint.
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
    sender: String,
    timeout: Duration,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>, sender: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            sender: sender.into(),
            timeout,
        })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), MailerError> {
        let payload = WebhookPayload {
            to: recipient,
            from: &self.sender,
            template,
            data,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MailerError::Timeout(self.timeout)
                } else {
                    MailerError::ConnectionError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = recipient, template, "Notification delivered to webhook");
        Ok(())
    }
}

/// Build the mailer selected by `[mailer]`.
pub fn from_config(config: &MailerConfig) -> Result<Arc<dyn Mailer>> {
    match config.kind {
        MailerKind::Log => Ok(Arc::new(LogMailer::new(config.sender.clone()))),
        MailerKind::Webhook => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| eyre!("mailer.url is required for the webhook mailer"))?;
            let mailer = WebhookMailer::new(url, config.sender.clone(), config.timeout()?)?;
            Ok(Arc::new(mailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mailer = LogMailer::new("noreply@example.com");
        mailer
            .send("a@example.com", "user_welcome", json!({"userID": 1}))
            .await
            .unwrap();
    }

    #[test]
    fn test_webhook_requires_url() {
        let config = MailerConfig {
            kind: MailerKind::Webhook,
            url: None,
            ..MailerConfig::default()
        };
        assert!(from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_a_connection_error() {
        let mailer = WebhookMailer::new(
            "http://127.0.0.1:9/relay",
            "noreply@example.com",
            Duration::from_secs(2),
        )
        .unwrap();
        let result = mailer
            .send("a@example.com", "user_welcome", json!({}))
            .await;
        assert!(matches!(
            result,
            Err(MailerError::ConnectionError(_) | MailerError::Timeout(_))
        ));
    }
}
