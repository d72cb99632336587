mod discord;
mod telegram;
mod templates;

pub use discord::DiscordWebhookNotifier;
pub use telegram::TelegramNotifier;
pub use templates::MessageTemplate;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{AlertMessage, EventClass, Tier};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// One line of the daily summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub ticker: String,
    pub composite: Option<f64>,
    pub tier: Option<Tier>,
    pub classification: Option<EventClass>,
    pub error: Option<String>,
}

/// Everything the scanner sends to a chat channel.
#[derive(Debug, Clone)]
pub enum Notification {
    PreSignal(AlertMessage),
    /// Low priority; never passes through the alert gate
    ScanFailure { ticker: String, error: String },
    DailySummary { date: String, rows: Vec<SummaryRow> },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::PreSignal(_) => "pre_signal",
            Notification::ScanFailure { .. } => "scan_failure",
            Notification::DailySummary { .. } => "daily_summary",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Notification::PreSignal(alert) => alert.timestamp,
            _ => Utc::now(),
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Telegram error: {0}")]
    Telegram(String),
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("{channel} send timed out after {secs}s")]
    Timeout { channel: String, secs: u64 },
    #[error("Invalid value for {key}: {value:?}")]
    Config { key: String, value: String },
}

/// Pacing, timeout and retry applied to every send
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Minimum gap between consecutive sends on any channel
    pub min_interval: Duration,
    pub send_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: usize,
    pub backoff_base: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1100),
            send_timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub policy: DeliveryPolicy,
}

impl NotificationConfig {
    /// Load from environment variables. An unparsable pacing value is an
    /// error rather than a silent fallback to the default.
    pub fn from_env() -> Result<Self, NotificationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotificationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str| -> Result<Option<u64>, NotificationError> {
            match text(key) {
                Some(raw) => raw.parse().map(Some).map_err(|_| NotificationError::Config {
                    key: key.to_string(),
                    value: raw,
                }),
                None => Ok(None),
            }
        };

        let defaults = DeliveryPolicy::default();
        let policy = DeliveryPolicy {
            min_interval: number("NOTIFY_MIN_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
            send_timeout: number("NOTIFY_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.send_timeout),
            max_retries: number("NOTIFY_MAX_RETRIES")?
                .map(|n| n as usize)
                .unwrap_or(defaults.max_retries),
            backoff_base: defaults.backoff_base,
        };

        Ok(Self {
            telegram_bot_token: text("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: text("TELEGRAM_CHAT_ID"),
            discord_webhook_url: text("DISCORD_WEBHOOK_URL"),
            policy,
        })
    }
}

/// Result of one dispatch across all channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        self.delivered > 0
    }
}

/// The main notification service: dispatches to all configured channels,
/// one send at a time with a fixed minimum gap.
pub struct NotificationService {
    channels: Vec<Arc<dyn NotificationChannel>>,
    policy: DeliveryPolicy,
    last_send: Mutex<Option<Instant>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

        match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => {
                channels.push(Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())));
                tracing::info!("Telegram notifications enabled");
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("Telegram needs both TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID; channel disabled");
            }
            (None, None) => {}
        }

        if let Some(ref webhook_url) = config.discord_webhook_url {
            channels.push(Arc::new(DiscordWebhookNotifier::new(webhook_url.clone())));
            tracing::info!("Discord webhook notifications enabled");
        }

        if channels.is_empty() {
            tracing::info!(
                "No notification channels configured (set TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID or DISCORD_WEBHOOK_URL)"
            );
        }

        Self::with_channels(channels, config.policy.clone())
    }

    pub fn with_channels(channels: Vec<Arc<dyn NotificationChannel>>, policy: DeliveryPolicy) -> Self {
        Self {
            channels,
            policy,
            last_send: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Sends to every channel, awaiting completion.
    ///
    /// Transport failures are retried with backoff, then logged and dropped;
    /// this never returns an error.
    pub async fn send(&self, notification: &Notification) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::default();

        // held for the whole dispatch so concurrent callers queue behind the pacing
        let mut last_send = self.last_send.lock().await;

        for channel in &self.channels {
            match self.send_with_retry(channel.as_ref(), notification, &mut *last_send).await {
                Ok(()) => {
                    tracing::debug!(kind = notification.kind(), "Sent notification via {}", channel.name());
                    outcome.delivered += 1;
                }
                Err(e) => {
                    tracing::error!(
                        kind = notification.kind(),
                        channel = channel.name(),
                        "Dropping notification after {} retries: {}",
                        self.policy.max_retries,
                        e
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    async fn send_with_retry(
        &self,
        channel: &dyn NotificationChannel,
        notification: &Notification,
        last_send: &mut Option<Instant>,
    ) -> Result<(), NotificationError> {
        let mut attempt = 0;
        loop {
            if let Some(prev) = *last_send {
                tokio::time::sleep_until(prev + self.policy.min_interval).await;
            }
            *last_send = Some(Instant::now());

            let result = match tokio::time::timeout(self.policy.send_timeout, channel.send(notification)).await {
                Ok(r) => r,
                Err(_) => Err(NotificationError::Timeout {
                    channel: channel.name().to_string(),
                    secs: self.policy.send_timeout.as_secs(),
                }),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.policy.max_retries => {
                    attempt += 1;
                    let shift = (attempt - 1).min(16) as u32;
                    let delay = self.policy.backoff_base.saturating_mul(1u32 << shift);
                    tracing::warn!(
                        channel = channel.name(),
                        attempt = attempt,
                        "Notification send failed, retrying in {:.1}s: {}",
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<NotificationConfig, NotificationError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NotificationConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_config_parses_pacing_and_rejects_garbage() {
        let c = config(&[
            ("NOTIFY_MIN_INTERVAL_MS", "2000"),
            ("TELEGRAM_BOT_TOKEN", "abc"),
            ("DISCORD_WEBHOOK_URL", "  "),
        ])
        .unwrap();
        assert_eq!(c.policy.min_interval, Duration::from_millis(2000));
        assert_eq!(c.policy.max_retries, DeliveryPolicy::default().max_retries);
        assert_eq!(c.telegram_bot_token.as_deref(), Some("abc"));
        assert!(c.discord_webhook_url.is_none());

        let err = config(&[("NOTIFY_MAX_RETRIES", "three")]).unwrap_err();
        assert!(matches!(err, NotificationError::Config { ref key, .. } if key == "NOTIFY_MAX_RETRIES"));
    }

    /// Records the instant of every attempt; fails the first `fail_first` attempts
    struct RecordingChannel {
        attempts: StdMutex<Vec<std::time::Instant>>,
        delivered: StdMutex<Vec<String>>,
        fail_first: usize,
        calls: AtomicUsize,
    }

    impl RecordingChannel {
        fn new(fail_first: usize) -> Self {
            Self {
                attempts: StdMutex::new(Vec::new()),
                delivered: StdMutex::new(Vec::new()),
                fail_first,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
            self.attempts.lock().unwrap().push(std::time::Instant::now());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(NotificationError::Telegram("HTTP 502".to_string()));
            }
            self.delivered.lock().unwrap().push(notification.kind().to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct HangingChannel;

    #[async_trait]
    impl NotificationChannel for HangingChannel {
        async fn send(&self, _notification: &Notification) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    fn policy(min_interval_ms: u64) -> DeliveryPolicy {
        DeliveryPolicy {
            min_interval: Duration::from_millis(min_interval_ms),
            send_timeout: Duration::from_millis(50),
            max_retries: 2,
            backoff_base: Duration::from_millis(5),
        }
    }

    fn failure(ticker: &str) -> Notification {
        Notification::ScanFailure {
            ticker: ticker.to_string(),
            error: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_consecutive_sends_are_spaced() {
        let channel = Arc::new(RecordingChannel::new(0));
        let service = NotificationService::with_channels(vec![channel.clone()], policy(40));

        for t in ["AMAT", "LRCX", "KLAC"] {
            assert!(service.send(&failure(t)).await.is_delivered());
        }

        let attempts = channel.attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(40));
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let channel = Arc::new(RecordingChannel::new(2));
        let service = NotificationService::with_channels(vec![channel.clone()], policy(0));

        let outcome = service.send(&failure("AMAT")).await;
        assert_eq!(outcome, DeliveryOutcome { delivered: 1, failed: 0 });
        assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_without_error() {
        let channel = Arc::new(RecordingChannel::new(usize::MAX));
        let service = NotificationService::with_channels(vec![channel.clone()], policy(0));

        let outcome = service.send(&failure("AMAT")).await;
        assert_eq!(outcome, DeliveryOutcome { delivered: 0, failed: 1 });
        // first attempt + 2 retries
        assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hanging_channel_times_out_and_others_still_deliver() {
        let recording = Arc::new(RecordingChannel::new(0));
        let service = NotificationService::with_channels(
            vec![Arc::new(HangingChannel), recording.clone()],
            policy(0),
        );

        let outcome = service.send(&failure("AMAT")).await;
        assert_eq!(outcome, DeliveryOutcome { delivered: 1, failed: 1 });
        assert_eq!(*recording.delivered.lock().unwrap(), vec!["scan_failure".to_string()]);
    }

    #[tokio::test]
    async fn test_no_channels_is_a_noop() {
        let service = NotificationService::new(&NotificationConfig::default());
        assert!(!service.is_enabled());
        assert_eq!(service.send(&failure("AMAT")).await, DeliveryOutcome::default());
    }
}
