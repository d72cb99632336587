//! Durable per-key state behind explicit get/put interfaces.
//!
//! Records are created lazily on first access and need no teardown. Keys are
//! per ticker, so concurrent tickers never contend on the same entry.

use async_trait::async_trait;
use dashmap::DashMap;
use sentinel_core::{SentinelError, SignalCategory};
use thiserror::Error;

use crate::alert_gate::AlertState;
use crate::baseline::BaselineRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<StoreError> for SentinelError {
    fn from(err: StoreError) -> Self {
        SentinelError::Store(err.to_string())
    }
}

#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn get_baseline(
        &self,
        ticker: &str,
        category: SignalCategory,
    ) -> Result<Option<BaselineRecord>, StoreError>;

    async fn put_baseline(&self, record: &BaselineRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AlertStateStore: Send + Sync {
    async fn get_alert_state(&self, ticker: &str) -> Result<Option<AlertState>, StoreError>;

    async fn put_alert_state(&self, state: &AlertState) -> Result<(), StoreError>;
}

/// In-process store; state lives as long as the value does.
#[derive(Default)]
pub struct MemoryStore {
    baselines: DashMap<(String, SignalCategory), BaselineRecord>,
    alert_states: DashMap<String, AlertState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaselineStore for MemoryStore {
    async fn get_baseline(
        &self,
        ticker: &str,
        category: SignalCategory,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        Ok(self
            .baselines
            .get(&(ticker.to_string(), category))
            .map(|r| r.value().clone()))
    }

    async fn put_baseline(&self, record: &BaselineRecord) -> Result<(), StoreError> {
        self.baselines
            .insert((record.ticker.clone(), record.category), record.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertStateStore for MemoryStore {
    async fn get_alert_state(&self, ticker: &str) -> Result<Option<AlertState>, StoreError> {
        Ok(self.alert_states.get(ticker).map(|s| s.value().clone()))
    }

    async fn put_alert_state(&self, state: &AlertState) -> Result<(), StoreError> {
        self.alert_states.insert(state.ticker.clone(), state.clone());
        Ok(())
    }
}
