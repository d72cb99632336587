//! Composite score to tier. Hysteresis lives in the alert gate, not here.

use sentinel_core::Tier;

use crate::config::TierThresholds;

impl TierThresholds {
    /// Pure score-to-tier mapping. Lower bounds are inclusive, so a score
    /// exactly on a threshold lands in the higher tier.
    pub fn classify(&self, score: f64) -> Tier {
        if score >= self.critical {
            Tier::Critical
        } else if score >= self.alert {
            Tier::Alert
        } else if score >= self.watch {
            Tier::Watch
        } else {
            Tier::Normal
        }
    }
}
