//! Weighted fusion of the category scores into the composite PSI.
//!
//! A category with no score does not count as zero. Its weight is spread
//! proportionally over the categories that are present, so a ticker with no
//! options chain is not held down by the missing feed.

use sentinel_core::{CategoryScore, SignalCategory};

use crate::config::CategoryWeights;

/// Composite score with the per-category breakdown that produced it
#[derive(Debug, Clone)]
pub struct FusedScore {
    pub composite: f64,
    pub categories: Vec<CategoryScore>,
}

impl FusedScore {
    pub fn contribution(&self, category: SignalCategory) -> f64 {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.contribution)
            .unwrap_or(0.0)
    }

    pub fn effective_weight(&self, category: SignalCategory) -> f64 {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.effective_weight)
            .unwrap_or(0.0)
    }
}

pub struct PsiFusion {
    weights: CategoryWeights,
}

impl PsiFusion {
    pub fn new(weights: CategoryWeights) -> Self {
        Self { weights }
    }

    /// Returns `None` when every category is absent; the ticker is then
    /// reported but never tiered.
    pub fn fuse(
        &self,
        options: Option<f64>,
        attention: Option<f64>,
        disclosure: Option<f64>,
    ) -> Option<FusedScore> {
        self.fuse_with_raw([
            (SignalCategory::Options, options, options),
            (SignalCategory::Attention, attention, attention),
            (SignalCategory::Disclosure, disclosure, disclosure),
        ])
    }

    /// Like [`fuse`](Self::fuse) but carries each category's pre-baseline
    /// raw score into the breakdown: `(category, raw, fusion input)`.
    pub fn fuse_with_raw(
        &self,
        inputs: [(SignalCategory, Option<f64>, Option<f64>); 3],
    ) -> Option<FusedScore> {
        // non-finite inputs are treated as absent
        let inputs = inputs.map(|(category, raw, score)| {
            let score = score.filter(|s| s.is_finite()).map(|s| s.clamp(0.0, 10.0));
            (category, raw, score)
        });

        let present_weight: f64 = inputs
            .iter()
            .filter(|(_, _, score)| score.is_some())
            .map(|(category, _, _)| self.weights.weight(*category))
            .sum();

        if present_weight <= 0.0 {
            return None;
        }

        let categories: Vec<CategoryScore> = inputs
            .iter()
            .map(|(category, raw, score)| {
                let base_weight = self.weights.weight(*category);
                let effective_weight = match score {
                    Some(_) => base_weight / present_weight,
                    None => 0.0,
                };
                CategoryScore {
                    category: *category,
                    raw: *raw,
                    score: *score,
                    base_weight,
                    effective_weight,
                    contribution: effective_weight * score.unwrap_or(0.0),
                }
            })
            .collect();

        let composite = categories
            .iter()
            .map(|c| c.contribution)
            .sum::<f64>()
            .clamp(0.0, 10.0);

        Some(FusedScore {
            composite,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fusion() -> PsiFusion {
        PsiFusion::new(CategoryWeights::default())
    }

    #[test]
    fn test_all_present_weighted_sum() {
        let fused = fusion().fuse(Some(8.0), Some(6.0), Some(4.0)).unwrap();
        let expected = 0.35 * 8.0 + 0.30 * 6.0 + 0.35 * 4.0;
        assert!((fused.composite - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_attention_renormalizes() {
        let fused = fusion().fuse(Some(8.0), None, Some(2.0)).unwrap();
        assert!((fused.effective_weight(SignalCategory::Options) - 0.5).abs() < 1e-9);
        assert!((fused.effective_weight(SignalCategory::Disclosure) - 0.5).abs() < 1e-9);
        assert_eq!(fused.effective_weight(SignalCategory::Attention), 0.0);
        assert!((fused.composite - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_is_not_zero() {
        // treating the absent category as 0 would give 0.35 * 8 = 2.8
        let fused = fusion().fuse(Some(8.0), None, None).unwrap();
        assert!((fused.composite - 8.0).abs() < 1e-9);
        let zeroed = fusion().fuse(Some(8.0), Some(0.0), Some(0.0)).unwrap();
        assert!((zeroed.composite - 2.8).abs() < 1e-9);
    }

    #[test]
    fn test_all_absent_is_undefined() {
        assert!(fusion().fuse(None, None, None).is_none());
        assert!(fusion().fuse(Some(f64::NAN), None, None).is_none());
    }

    #[test]
    fn test_effective_weights_sum_to_one_for_every_combination() {
        let f = fusion();
        let values = [None, Some(0.0), Some(3.3), Some(10.0), Some(25.0)];
        for o in values {
            for a in values {
                for d in values {
                    let Some(fused) = f.fuse(o, a, d) else {
                        assert!(o.is_none() && a.is_none() && d.is_none());
                        continue;
                    };
                    let total: f64 = fused.categories.iter().map(|c| c.effective_weight).sum();
                    assert!((total - 1.0).abs() < 1e-9);
                    assert!((0.0..=10.0).contains(&fused.composite));
                    let sum: f64 = fused.categories.iter().map(|c| c.contribution).sum();
                    assert!((sum.clamp(0.0, 10.0) - fused.composite).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_raw_carried_through() {
        let fused = fusion()
            .fuse_with_raw([
                (SignalCategory::Options, Some(6.0), Some(2.5)),
                (SignalCategory::Attention, None, None),
                (SignalCategory::Disclosure, Some(8.0), Some(8.0)),
            ])
            .unwrap();
        let options = &fused.categories[0];
        assert_eq!(options.raw, Some(6.0));
        assert_eq!(options.score, Some(2.5));
    }
}
