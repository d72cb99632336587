use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;

/// Runtime settings for the scanner binary. PSI tunables live in
/// `psi_engine::PsiConfig`; channel credentials in `NotificationConfig`.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    // Watchlist
    pub watchlist_path: String,
    pub scan_ticker: Option<String>,

    // Scheduling
    pub scan_interval_seconds: u64, // 0 = single cycle (cron mode)
    pub concurrency: usize,

    // Collectors
    pub http_timeout_seconds: u64,
    pub http_max_retries: usize,
    pub polygon_api_key: Option<String>,
    pub polygon_rate_limit: usize, // requests per minute
    pub finnhub_api_key: Option<String>,
    pub sec_user_agent: String,

    // Reporting
    pub notify_failures: bool,
    pub daily_summary_hour_utc: u32,
    pub metrics_log_interval_cycles: u64,

    // Database
    pub database_url: String,
}

impl ScannerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            watchlist_path: text("WATCHLIST_PATH").unwrap_or_else(|| "config/watchlist.json".to_string()),
            scan_ticker: text("SCAN_TICKER").map(|t| t.to_uppercase()),

            scan_interval_seconds: parse(&lookup, "SCAN_INTERVAL_SECONDS", 0)?,
            concurrency: parse(&lookup, "SCAN_CONCURRENCY", 4)?,

            http_timeout_seconds: parse(&lookup, "HTTP_TIMEOUT_SECONDS", 15)?,
            http_max_retries: parse(&lookup, "HTTP_MAX_RETRIES", 3)?,
            polygon_api_key: text("POLYGON_API_KEY"),
            polygon_rate_limit: parse(&lookup, "POLYGON_RATE_LIMIT", 5)?,
            finnhub_api_key: text("FINNHUB_API_KEY"),
            sec_user_agent: text("SEC_USER_AGENT")
                .unwrap_or_else(|| "StockSentinel research@example.com".to_string()),

            notify_failures: parse(&lookup, "NOTIFY_FAILURES", false)?,
            daily_summary_hour_utc: parse(&lookup, "DAILY_SUMMARY_HOUR_UTC", 21)?,
            metrics_log_interval_cycles: parse(&lookup, "METRICS_LOG_INTERVAL_CYCLES", 1)?,

            database_url: text("DATABASE_URL").unwrap_or_else(|| "sqlite:sentinel.db".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("SCAN_CONCURRENCY must be at least 1");
        }
        if self.http_timeout_seconds == 0 {
            bail!("HTTP_TIMEOUT_SECONDS must be at least 1");
        }
        if self.polygon_rate_limit == 0 {
            bail!("POLYGON_RATE_LIMIT must be at least 1");
        }
        if self.daily_summary_hour_utc > 23 {
            bail!(
                "DAILY_SUMMARY_HOUR_UTC must be 0-23, got {}",
                self.daily_summary_hour_utc
            );
        }
        Ok(())
    }

    pub fn is_loop_mode(&self) -> bool {
        self.scan_interval_seconds > 0
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ScannerConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ScannerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.watchlist_path, "config/watchlist.json");
        assert_eq!(c.concurrency, 4);
        assert!(!c.is_loop_mode());
        assert!(!c.notify_failures);
        assert_eq!(c.daily_summary_hour_utc, 21);
        assert!(c.polygon_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("SCAN_TICKER", "amat"),
            ("SCAN_INTERVAL_SECONDS", "900"),
            ("NOTIFY_FAILURES", "true"),
            ("POLYGON_API_KEY", "  "),
        ])
        .unwrap();
        assert_eq!(c.scan_ticker.as_deref(), Some("AMAT"));
        assert!(c.is_loop_mode());
        assert!(c.notify_failures);
        assert!(c.polygon_api_key.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config(&[("SCAN_CONCURRENCY", "0")]).is_err());
        assert!(config(&[("SCAN_CONCURRENCY", "four")]).is_err());
        assert!(config(&[("DAILY_SUMMARY_HOUR_UTC", "24")]).is_err());
    }
}
