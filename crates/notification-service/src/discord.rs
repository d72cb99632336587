use async_trait::async_trait;
use sentinel_core::Tier;

use crate::templates::MessageTemplate;
use crate::{Notification, NotificationChannel, NotificationError};

/// Discord webhook notifier.
pub struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordWebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

fn embed_color(notification: &Notification) -> u32 {
    match notification {
        Notification::PreSignal(alert) => match alert.tier {
            Tier::Critical => 0xff0000,
            Tier::Alert => 0xff6600,
            Tier::Watch => 0xffcc00,
            Tier::Normal => 0x00ff00,
        },
        Notification::ScanFailure { .. } => 0x808080,
        Notification::DailySummary { .. } => 0x0099ff,
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "username": "Stock Sentinel",
            "embeds": [{
                "title": MessageTemplate::title(notification),
                "description": MessageTemplate::render(notification),
                "color": embed_color(notification),
                "timestamp": notification.timestamp().to_rfc3339(),
            }]
        });

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Discord(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotificationError::Discord(format!("HTTP {}", status)));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}
