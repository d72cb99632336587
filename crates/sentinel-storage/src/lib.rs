//! SQLite persistence for baselines, alert state and scanner key-value state.
//!
//! Baselines and alert state live in independent tables keyed by ticker;
//! nothing joins across tickers.

use std::collections::VecDeque;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use psi_engine::{AlertState, AlertStateStore, BaselineRecord, BaselineStore, StoreError};
use sentinel_core::{SignalCategory, Tier};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database and ensures the tables exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS psi_baselines (
                ticker TEXT NOT NULL,
                category TEXT NOT NULL,
                capacity INTEGER NOT NULL,
                samples TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (ticker, category)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS alert_state (
                ticker TEXT PRIMARY KEY,
                last_notified_tier TEXT NOT NULL,
                last_notified_at TEXT,
                cooldown_until TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scanner_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save a state key-value pair.
    pub async fn save_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO scanner_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a state value by key.
    pub async fn load_state(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM scanner_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Persist scan metrics for recovery after restart.
    pub async fn save_metrics(&self, metrics_json: &serde_json::Value) -> Result<()> {
        let json_str = serde_json::to_string(metrics_json)?;
        self.save_state("scan_metrics", &json_str).await
    }

    pub async fn load_metrics(&self) -> Result<Option<serde_json::Value>> {
        match self.load_state("scan_metrics").await? {
            Some(s) => Ok(serde_json::from_str(&s).ok()),
            None => Ok(None),
        }
    }

    /// Date (YYYY-MM-DD, UTC) of the last daily summary sent
    pub async fn save_last_summary_date(&self, date: &str) -> Result<()> {
        self.save_state("last_summary_date", date).await
    }

    pub async fn load_last_summary_date(&self) -> Result<Option<String>> {
        self.load_state("last_summary_date").await
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn parse_time(key: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("bad timestamp {:?}: {}", s, e),
            })
    })
    .transpose()
}

#[async_trait]
impl BaselineStore for SqliteStore {
    async fn get_baseline(
        &self,
        ticker: &str,
        category: SignalCategory,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT capacity, samples FROM psi_baselines WHERE ticker = ? AND category = ?",
        )
        .bind(ticker)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some((capacity, samples_json)) = row else {
            return Ok(None);
        };

        let samples: VecDeque<f64> =
            serde_json::from_str(&samples_json).map_err(|e| StoreError::Corrupt {
                key: format!("{}/{}", ticker, category),
                reason: e.to_string(),
            })?;

        Ok(Some(BaselineRecord {
            ticker: ticker.to_string(),
            category,
            capacity: capacity.max(0) as usize,
            samples,
        }))
    }

    async fn put_baseline(&self, record: &BaselineRecord) -> Result<(), StoreError> {
        let samples_json = serde_json::to_string(&record.samples).map_err(|e| StoreError::Corrupt {
            key: format!("{}/{}", record.ticker, record.category),
            reason: e.to_string(),
        })?;

        sqlx::query(
            "INSERT INTO psi_baselines (ticker, category, capacity, samples, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(ticker, category) DO UPDATE SET
                capacity = excluded.capacity,
                samples = excluded.samples,
                updated_at = excluded.updated_at",
        )
        .bind(&record.ticker)
        .bind(record.category.as_str())
        .bind(record.capacity as i64)
        .bind(samples_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl AlertStateStore for SqliteStore {
    async fn get_alert_state(&self, ticker: &str) -> Result<Option<AlertState>, StoreError> {
        let row: Option<(String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT last_notified_tier, last_notified_at, cooldown_until FROM alert_state WHERE ticker = ?",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some((tier, notified_at, cooldown_until)) = row else {
            return Ok(None);
        };

        let last_notified_tier = Tier::parse(&tier).ok_or_else(|| StoreError::Corrupt {
            key: ticker.to_string(),
            reason: format!("unknown tier {:?}", tier),
        })?;

        Ok(Some(AlertState {
            ticker: ticker.to_string(),
            last_notified_tier,
            last_notified_at: parse_time(ticker, notified_at)?,
            cooldown_until: parse_time(ticker, cooldown_until)?,
        }))
    }

    async fn put_alert_state(&self, state: &AlertState) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO alert_state (ticker, last_notified_tier, last_notified_at, cooldown_until, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(ticker) DO UPDATE SET
                last_notified_tier = excluded.last_notified_tier,
                last_notified_at = excluded.last_notified_at,
                cooldown_until = excluded.cooldown_until,
                updated_at = excluded.updated_at",
        )
        .bind(&state.ticker)
        .bind(state.last_notified_tier.as_str())
        .bind(state.last_notified_at.map(|t| t.to_rfc3339()))
        .bind(state.cooldown_until.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        tracing::debug!(
            ticker = %state.ticker,
            tier = %state.last_notified_tier,
            "Alert state saved"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use psi_engine::{AlertGate, BaselineConfig, Baselines};
    use std::sync::Arc;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let store = store().await;
        assert_eq!(store.load_state("missing").await.unwrap(), None);
        store.save_state("k", "v1").await.unwrap();
        store.save_state("k", "v2").await.unwrap();
        assert_eq!(store.load_state("k").await.unwrap(), Some("v2".to_string()));

        store.save_last_summary_date("2026-02-13").await.unwrap();
        assert_eq!(
            store.load_last_summary_date().await.unwrap().as_deref(),
            Some("2026-02-13")
        );
    }

    #[tokio::test]
    async fn test_baseline_persisted_and_bounded() {
        let store = Arc::new(store().await);
        let config = BaselineConfig {
            window: 3,
            ..BaselineConfig::default()
        };
        let baselines = Baselines::new(store.clone(), config);
        for v in [1.0, 2.0, 3.0, 4.0] {
            baselines
                .update_and_score("AMAT", SignalCategory::Attention, v)
                .await
                .unwrap();
        }
        let record = store
            .get_baseline("AMAT", SignalCategory::Attention)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.samples, VecDeque::from(vec![2.0, 3.0, 4.0]));
        assert_eq!(record.capacity, 3);
        assert!(store
            .get_baseline("AMAT", SignalCategory::Options)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_alert_state_survives_gate_instances() {
        let store = Arc::new(store().await);
        let now = Utc::now();

        let gate = AlertGate::new(store.clone(), 120);
        assert!(gate.should_notify("AMAT", Tier::Alert, now).await.unwrap());

        // a new gate over the same store sees the persisted high-water mark
        let gate = AlertGate::new(store.clone(), 120);
        assert!(!gate
            .should_notify("AMAT", Tier::Alert, now + Duration::minutes(15))
            .await
            .unwrap());

        let state = store.get_alert_state("AMAT").await.unwrap().unwrap();
        assert_eq!(state.last_notified_tier, Tier::Alert);
        assert!(state.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_tier_is_reported() {
        let store = store().await;
        sqlx::query("INSERT INTO alert_state (ticker, last_notified_tier) VALUES ('AMAT', 'bogus')")
            .execute(store.pool())
            .await
            .unwrap();
        let err = store.get_alert_state("AMAT").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_metrics_roundtrip() {
        let store = store().await;
        let json = serde_json::json!({"cycles": 3});
        store.save_metrics(&json).await.unwrap();
        assert_eq!(store.load_metrics().await.unwrap(), Some(json));
    }
}
