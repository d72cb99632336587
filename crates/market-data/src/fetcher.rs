use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use sentinel_core::SentinelError;
use serde::de::DeserializeOwned;

use crate::rate_limit::RateLimiter;

/// Timeout and retry policy shared by every collector
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: usize,
    /// First backoff; doubles each retry
    pub backoff_base: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            user_agent: format!("stock-sentinel/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Backoff before retry `attempt` (1-based): base, 2*base, 4*base, ...
pub fn backoff_delay(base: Duration, attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    base.saturating_mul(1u32 << shift)
}

/// HTTP GET with a bounded timeout, retry with exponential backoff on 429,
/// 5xx and transport errors, and optional rate limiting.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, SentinelError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SentinelError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            rate_limiter: None,
        })
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(Arc::new(limiter));
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GETs `url` and decodes the JSON body.
    ///
    /// Returns `Ok(None)` for 401/403/404: the data is unavailable for this
    /// key or ticker, which is not a failure.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, SentinelError> {
        let mut last_err = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.config.backoff_base, attempt);
                tracing::warn!(
                    url = %url,
                    attempt = attempt,
                    max_retries = self.config.max_retries,
                    "Retrying in {:.1}s: {}",
                    delay.as_secs_f64(),
                    last_err
                );
                tokio::time::sleep(delay).await;
            }

            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire().await;
            }

            let response = match self.client.get(url).query(query).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_err = format!("request error: {}", e);
                    if e.is_timeout() || e.is_connect() || e.is_request() {
                        continue;
                    }
                    return Err(SentinelError::Collector(last_err));
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_err = format!("HTTP {}", status);
                continue;
            }
            if matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
            ) {
                tracing::debug!(url = %url, status = %status, "No data available");
                return Ok(None);
            }
            if !status.is_success() {
                return Err(SentinelError::Collector(format!(
                    "HTTP {}: {}",
                    status,
                    response.text().await.unwrap_or_default()
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| SentinelError::Collector(format!("body read error: {}", e)))?;
            return serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| SentinelError::Parse(format!("{}: {}", url, e)));
        }

        Err(SentinelError::Collector(format!(
            "{} after {} retries: {}",
            url, self.config.max_retries, last_err
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_connection_refused_exhausts_retries() {
        let fetcher = HttpFetcher::new(FetchConfig {
            timeout: Duration::from_millis(500),
            max_retries: 2,
            backoff_base: Duration::from_millis(5),
            ..FetchConfig::default()
        })
        .unwrap();
        // port 9 (discard) on localhost is not listening in test environments
        let err = fetcher
            .get_json::<serde_json::Value>("http://127.0.0.1:9/none", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SentinelError::Collector(_)));
    }
}
