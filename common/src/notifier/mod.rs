// Notifier gateway: one logical notification fanned out to every configured target

pub mod http;
pub mod targets;

pub use http::HttpNotificationSender;
pub use targets::DeliveryTarget;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const ERROR_TITLE: &str = "Reddit Monitor Error";

/// Capability that delivers one notification to a set of targets.
///
/// Returns `true` if at least one target accepted it. Implementations must
/// not fail; per-target problems are logged and count as not delivered.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, title: &str, body: &str, targets: &[String]) -> bool;
}

/// Routes notifications to the targets from the credentials
#[derive(Clone)]
pub struct NotifierGateway {
    sender: Arc<dyn NotificationSender>,
    targets: Arc<Vec<String>>,
}

impl NotifierGateway {
    pub fn new(sender: Arc<dyn NotificationSender>, targets: Vec<String>) -> Self {
        Self {
            sender,
            targets: Arc::new(targets),
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Send a notification. Without targets this is a no-op returning `false`.
    pub async fn notify(&self, title: &str, body: &str) -> bool {
        if self.targets.is_empty() {
            debug!("No notification services configured, skipping notification");
            return false;
        }

        info!(targets = self.targets.len(), "Sending notification");
        let delivered = self.sender.send(title, body, &self.targets).await;
        if delivered {
            info!("Notification sent successfully");
            crate::telemetry::record_notification(true);
        } else {
            warn!("Notification delivery failed for all targets");
            crate::telemetry::record_notification(false);
        }
        delivered
    }

    /// Report an error through the same targets. Never fails the caller.
    pub async fn notify_error(&self, context: &str, error_text: &str) -> bool {
        if self.targets.is_empty() {
            warn!(context, "No notification services configured, cannot send error notification");
            return false;
        }

        error!(context, error = error_text, "Sending error notification");
        let body = format!("Error in Reddit monitor {}: {}", context, error_text);
        let delivered = self.notify(ERROR_TITLE, &body).await;
        if !delivered {
            warn!(context, "Error notification may have failed");
        }
        delivered
    }
}
