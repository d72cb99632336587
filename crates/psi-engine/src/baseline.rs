//! Rolling per-ticker, per-category history and the acceleration transform.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sentinel_core::SignalCategory;
use statrs::statistics::Statistics;

use crate::config::BaselineConfig;
use crate::store::{BaselineStore, StoreError};

/// FIFO ring buffer of recent raw sub-scores for one ticker/category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub ticker: String,
    pub category: SignalCategory,
    pub capacity: usize,
    pub samples: VecDeque<f64>,
}

impl BaselineRecord {
    pub fn new(ticker: &str, category: SignalCategory, capacity: usize) -> Self {
        Self {
            ticker: ticker.to_string(),
            category,
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().mean())
    }

    pub fn std_dev(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        Some(self.samples.iter().population_std_dev())
    }

    /// Appends, evicting the oldest sample once at capacity.
    pub fn push(&mut self, value: f64) {
        // capacity may shrink between runs when the window is reconfigured
        while self.samples.len() >= self.capacity.max(1) {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Records `raw` and returns its acceleration against the pre-update history.
    ///
    /// With fewer than two prior samples there is no baseline yet and the
    /// raw score is returned unchanged. Otherwise the upward z-score
    /// `(raw - mean) / max(stddev, min_stddev)` is clipped to `[0, z_cap]`
    /// and rescaled to `[0, 10]`. A reading at or below the mean scores 0.
    ///
    /// Always mutates the buffer; call at most once per cycle.
    pub fn update_and_score(&mut self, raw: f64, config: &BaselineConfig) -> f64 {
        let raw = raw.clamp(0.0, 10.0);
        let score = match (self.mean(), self.std_dev()) {
            (Some(mean), Some(std_dev)) => {
                let z = (raw - mean) / std_dev.max(config.min_stddev);
                z.clamp(0.0, config.z_cap) / config.z_cap * 10.0
            }
            _ => raw,
        };
        self.push(raw);
        score
    }
}

/// Store-backed baselines with lazy record creation
#[derive(Clone)]
pub struct Baselines {
    store: Arc<dyn BaselineStore>,
    config: BaselineConfig,
}

impl Baselines {
    pub fn new(store: Arc<dyn BaselineStore>, config: BaselineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Loads (or creates) the record, scores `raw` and persists the update.
    pub async fn update_and_score(
        &self,
        ticker: &str,
        category: SignalCategory,
        raw: f64,
    ) -> Result<f64, StoreError> {
        let mut record = match self.store.get_baseline(ticker, category).await? {
            Some(mut record) => {
                record.capacity = self.config.window;
                record
            }
            None => BaselineRecord::new(ticker, category, self.config.window),
        };

        let acceleration = record.update_and_score(raw, &self.config);
        self.store.put_baseline(&record).await?;

        tracing::debug!(
            ticker = %ticker,
            category = %category,
            raw = raw,
            acceleration = acceleration,
            history = record.len(),
            "Baseline updated"
        );

        Ok(acceleration)
    }
}
