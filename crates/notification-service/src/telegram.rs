use async_trait::async_trait;
use reqwest::StatusCode;

use crate::templates::MessageTemplate;
use crate::{Notification, NotificationChannel, NotificationError};

const API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` in MarkdownV2.
pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            chat_id,
        }
    }

    async fn post(&self, text: &str, markdown: bool) -> Result<StatusCode, NotificationError> {
        let mut payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if markdown {
            payload["parse_mode"] = serde_json::Value::from("MarkdownV2");
        }

        let resp = self
            .client
            .post(format!("{}/bot{}/sendMessage", API_BASE, self.token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Telegram(e.without_url().to_string()))?;

        Ok(resp.status())
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let text = MessageTemplate::render(notification);

        let status = self.post(&text, true).await?;
        if status.is_success() {
            return Ok(());
        }

        // a markup rejection would fail on every retry; resend unformatted once
        if status == StatusCode::BAD_REQUEST {
            tracing::warn!("Telegram rejected MarkdownV2, resending as plain text");
            let status = self.post(&text, false).await?;
            if status.is_success() {
                return Ok(());
            }
            return Err(NotificationError::Telegram(format!("HTTP {}", status)));
        }

        Err(NotificationError::Telegram(format!("HTTP {}", status)))
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
