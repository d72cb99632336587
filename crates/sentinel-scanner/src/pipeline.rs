//! One ticker, one cycle: fetch -> normalize -> evaluate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use psi_engine::{Evaluation, PsiEngine, StoreError};
use sentinel_core::{
    AttentionSource, DisclosureSource, OptionsSource, PriceSource, SentinelError, WatchItem,
};

/// Collector set. A missing collector leaves its category absent.
#[derive(Clone, Default)]
pub struct Collectors {
    pub options: Option<Arc<dyn OptionsSource>>,
    pub attention: Option<Arc<dyn AttentionSource>>,
    pub disclosure: Option<Arc<dyn DisclosureSource>>,
    pub price: Option<Arc<dyn PriceSource>>,
}

impl Collectors {
    /// Number of scoring categories with a collector
    pub fn configured(&self) -> usize {
        [
            self.options.is_some(),
            self.attention.is_some(),
            self.disclosure.is_some(),
        ]
        .iter()
        .filter(|c| **c)
        .count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("every collector failed: {0}")]
    AllCollectorsFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct TickerPipeline {
    collectors: Collectors,
    engine: Arc<PsiEngine>,
}

impl TickerPipeline {
    pub fn new(collectors: Collectors, engine: Arc<PsiEngine>) -> Self {
        Self { collectors, engine }
    }

    pub fn engine(&self) -> &PsiEngine {
        &self.engine
    }

    /// A collector error degrades its category to absent; only when every
    /// configured collector errored does the ticker fail.
    pub async fn process(&self, item: &WatchItem, now: DateTime<Utc>) -> Result<Evaluation, PipelineError> {
        let normalizer = self.engine.normalizer();
        let attention_since = now - Duration::hours(normalizer.config().attention_window_hours);
        let disclosure_since = now - Duration::hours(normalizer.config().disclosure_window_hours);

        let (options, attention, disclosures, price) = tokio::join!(
            async {
                match &self.collectors.options {
                    Some(source) => source.options_snapshot(item).await,
                    None => Ok(None),
                }
            },
            async {
                match &self.collectors.attention {
                    Some(source) => source.attention_items(item, attention_since).await.map(Some),
                    None => Ok(None),
                }
            },
            async {
                match &self.collectors.disclosure {
                    Some(source) => source.disclosures(item, disclosure_since).await.map(Some),
                    None => Ok(None),
                }
            },
            async {
                match &self.collectors.price {
                    Some(source) => source.price_snapshot(item).await,
                    None => Ok(None),
                }
            },
        );

        let mut errors: Vec<String> = Vec::new();
        let options = degrade(&item.ticker, "options", options, &mut errors);
        let attention = degrade(&item.ticker, "attention", attention, &mut errors);
        let disclosures = degrade(&item.ticker, "disclosure", disclosures, &mut errors);
        let price = match price {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(ticker = %item.ticker, "Price context unavailable: {}", e);
                None
            }
        };

        let configured = self.collectors.configured();
        if configured > 0 && errors.len() == configured {
            return Err(PipelineError::AllCollectorsFailed(errors.join("; ")));
        }

        let samples = vec![
            normalizer.normalize_options(&item.ticker, options.as_ref(), now),
            normalizer.normalize_attention(item, attention.as_deref(), disclosures.as_deref(), now),
            normalizer.normalize_disclosure(&item.ticker, disclosures.as_deref(), now),
        ];

        for sample in &samples {
            tracing::debug!(
                ticker = %item.ticker,
                category = %sample.category,
                score = ?sample.score,
                evidence = sample.evidence.len(),
                "Normalized"
            );
        }

        Ok(self.engine.evaluate(item, &samples, price.as_ref(), now).await?)
    }
}

/// `Err` becomes "unavailable" for this cycle, with the error kept for reporting
fn degrade<T>(
    ticker: &str,
    category: &str,
    result: Result<Option<T>, SentinelError>,
    errors: &mut Vec<String>,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(ticker = %ticker, category = category, "Collector failed, category absent this cycle: {}", e);
            errors.push(format!("{}: {}", category, e));
            None
        }
    }
}
