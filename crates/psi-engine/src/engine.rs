//! Per-ticker PSI evaluation: baseline -> fusion -> tier -> flash -> gate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentinel_core::{
    AlertMessage, FlashReport, PriceSnapshot, PsiResult, SignalCategory, SignalSample, Tier, WatchItem,
};

use crate::alert_gate::{AlertGate, GateOutcome};
use crate::baseline::Baselines;
use crate::config::PsiConfig;
use crate::flash_reason::FlashReasonAttributor;
use crate::fusion::PsiFusion;
use crate::normalizer::SignalNormalizer;
use crate::store::{AlertStateStore, BaselineStore, StoreError};

/// Everything computed for one ticker in one cycle
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub ticker: String,
    /// `None` when every category was absent (reported, never tiered)
    pub result: Option<PsiResult>,
    pub report: Option<FlashReport>,
    pub gate: Option<GateOutcome>,
    /// Set only when the gate allowed a notification
    pub alert: Option<AlertMessage>,
}

impl Evaluation {
    pub fn tier(&self) -> Option<Tier> {
        self.result.as_ref().map(|r| r.tier)
    }
}

pub struct PsiEngine {
    config: PsiConfig,
    normalizer: SignalNormalizer,
    baselines: Baselines,
    fusion: PsiFusion,
    attributor: FlashReasonAttributor,
    gate: AlertGate,
}

impl PsiEngine {
    pub fn new(
        config: PsiConfig,
        baseline_store: Arc<dyn BaselineStore>,
        alert_store: Arc<dyn AlertStateStore>,
    ) -> Self {
        Self {
            normalizer: SignalNormalizer::new(config.normalizer.clone()),
            baselines: Baselines::new(baseline_store, config.baseline.clone()),
            fusion: PsiFusion::new(config.weights),
            attributor: FlashReasonAttributor::new(config.flash_top_n, config.title_max_chars),
            gate: AlertGate::new(alert_store, config.cooldown_minutes),
            config,
        }
    }

    pub fn config(&self) -> &PsiConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &SignalNormalizer {
        &self.normalizer
    }

    /// Scores one ticker from its normalized samples.
    ///
    /// Mutates baseline history once per present category, and alert state
    /// when the gate decides to notify or reset.
    pub async fn evaluate(
        &self,
        watch: &WatchItem,
        samples: &[SignalSample],
        price: Option<&PriceSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, StoreError> {
        let mut inputs = SignalCategory::ALL.map(|category| (category, None, None));

        for (category, raw, score) in inputs.iter_mut() {
            let Some(value) = samples
                .iter()
                .find(|s| s.category == *category)
                .and_then(|s| s.score)
                .filter(|v| v.is_finite())
            else {
                continue;
            };

            let acceleration = self
                .baselines
                .update_and_score(&watch.ticker, *category, value)
                .await?;

            *raw = Some(value);
            *score = if self.config.baseline.accelerated.contains(category) {
                Some(acceleration)
            } else {
                Some(value)
            };
        }

        let Some(fused) = self.fusion.fuse_with_raw(inputs) else {
            tracing::info!(ticker = %watch.ticker, "No category data this cycle, skipping tier");
            return Ok(Evaluation {
                ticker: watch.ticker.clone(),
                result: None,
                report: None,
                gate: None,
                alert: None,
            });
        };

        let tier = self.config.tiers.classify(fused.composite);
        let result = PsiResult {
            ticker: watch.ticker.clone(),
            composite: fused.composite,
            categories: fused.categories.clone(),
            tier,
            timestamp: now,
        };

        let report = if tier >= Tier::Alert {
            Some(self.attributor.attribute(samples, &fused, price))
        } else {
            None
        };

        let gate = self.gate.check(&watch.ticker, tier, now).await?;

        let alert = gate.notify.then(|| AlertMessage {
            ticker: watch.ticker.clone(),
            name: watch.name.clone(),
            tier,
            previous_tier: gate.previous_tier,
            composite_score: fused.composite,
            categories: fused.categories.clone(),
            reasons: report.as_ref().map(|r| r.reasons.clone()).unwrap_or_default(),
            classification: report.as_ref().map(|r| r.classification.clone()),
            price: price.cloned(),
            timestamp: now,
        });

        tracing::info!(
            ticker = %watch.ticker,
            psi = %format!("{:.1}", fused.composite),
            tier = %tier,
            gate = gate.reason.as_str(),
            "PSI evaluated"
        );

        Ok(Evaluation {
            ticker: watch.ticker.clone(),
            result: Some(result),
            report,
            gate: Some(gate),
            alert,
        })
    }
}
