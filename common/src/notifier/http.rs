// HTTP delivery of notifications to parsed targets

use crate::errors::NotifyError;
use crate::notifier::targets::{redact, DeliveryTarget};
use crate::notifier::NotificationSender;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use std::time::Duration;

/// Sends notifications over HTTP to every target concurrently
pub struct HttpNotificationSender {
    client: Client,
}

impl HttpNotificationSender {
    /// Create a sender whose requests time out after `timeout_seconds`
    pub fn new(timeout_seconds: u64) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| {
                NotifyError::RequestFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn build_request(&self, target: &DeliveryTarget, title: &str, body: &str) -> RequestBuilder {
        match target {
            DeliveryTarget::Webhook { url } => self.client.post(url).json(&json!({
                "title": title,
                "body": body,
            })),
            DeliveryTarget::Discord { webhook_url } => self.client.post(webhook_url).json(&json!({
                "content": format!("**{}**\n{}", title, body),
            })),
            DeliveryTarget::Pushover {
                user_key,
                app_token,
            } => self.client.post(target.endpoint()).form(&[
                ("token", app_token.as_str()),
                ("user", user_key.as_str()),
                ("title", title),
                ("message", body),
            ]),
            DeliveryTarget::Ntfy { url } => self
                .client
                .post(url)
                .header("Title", sanitize_header(title))
                .body(body.to_string()),
        }
    }

    /// Deliver to a single target
    #[tracing::instrument(skip(self, title, body), fields(target = %redact(raw_target)))]
    pub async fn deliver(&self, raw_target: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let target = DeliveryTarget::parse(raw_target)?;
        let response = self
            .build_request(&target, title, body)
            .send()
            .await
            .map_err(|e| NotifyError::RequestFailed(format!("{} delivery failed: {}", target.kind(), e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(kind = target.kind(), status = status.as_u16(), "Notification delivered");
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, title: &str, body: &str, targets: &[String]) -> bool {
        let attempts = targets
            .iter()
            .map(|target| async move { (target, self.deliver(target, title, body).await) });

        let mut delivered = 0usize;
        for (target, result) in join_all(attempts).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(target = %redact(target), error = %e, "Notification delivery failed");
                }
            }
        }
        delivered > 0
    }
}

// Header values cannot carry newlines or non-visible ASCII
fn sanitize_header(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string()
}
