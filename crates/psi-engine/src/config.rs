//! PSI tunables and their environment overrides.
//!
//! Every constant that shapes a score (weights, thresholds, baseline window,
//! cooldown) lives here so it can be changed without a rebuild. A config
//! that fails [`PsiConfig::validate`] must stop the process before any
//! ticker is scored.

use std::env;
use std::str::FromStr;

use sentinel_core::SignalCategory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid category weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid tier thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Invalid baseline settings: {0}")]
    InvalidBaseline(String),

    #[error("Alert cooldown must be between 1 and {max} minutes, got {0}", max = MAX_COOLDOWN_MINUTES)]
    InvalidCooldown(i64),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// 30 days. Larger values overflow timestamp arithmetic long before they
/// mean anything.
pub const MAX_COOLDOWN_MINUTES: i64 = 30 * 24 * 60;
/// Upper bound for the attention and disclosure look-back windows
pub const MAX_WINDOW_HOURS: i64 = 30 * 24;
pub const MAX_SHORT_EXPIRY_DAYS: i64 = 365;

/// Base weight of each category in the composite (must sum to 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub options: f64,
    pub attention: f64,
    pub disclosure: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            options: 0.35,
            attention: 0.30,
            disclosure: 0.35,
        }
    }
}

impl CategoryWeights {
    pub fn weight(&self, category: SignalCategory) -> f64 {
        match category {
            SignalCategory::Options => self.options,
            SignalCategory::Attention => self.attention,
            SignalCategory::Disclosure => self.disclosure,
        }
    }

    pub fn sum(&self) -> f64 {
        self.options + self.attention + self.disclosure
    }
}

/// Lower bounds (inclusive) of the Watch, Alert and Critical tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub watch: f64,
    pub alert: f64,
    pub critical: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            watch: 3.0,
            alert: 5.0,
            critical: 7.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Ring buffer capacity K
    pub window: usize,
    /// Floor for the stddev so a flat history does not explode the z-score
    pub min_stddev: f64,
    /// z-score mapped to 10
    pub z_cap: f64,
    /// Categories whose fusion input is acceleration rather than the raw score
    pub accelerated: Vec<SignalCategory>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window: 20,
            min_stddev: 1.0,
            z_cap: 4.0,
            accelerated: vec![SignalCategory::Options, SignalCategory::Attention],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Trailing attention window
    pub attention_window_hours: i64,
    /// Weighted item count at which attention reaches ~63% of full scale
    pub attention_saturation: f64,
    /// Trailing disclosure window (covers weekends)
    pub disclosure_window_hours: i64,
    /// Words that mark an item as breaking (weighted 1.5x)
    pub breaking_keywords: Vec<String>,
    /// Publishers treated as primary news wires for tie-breaking
    pub news_wire_sources: Vec<String>,
    /// Contracts expiring within this many days count as short-dated
    pub short_expiry_days: i64,
    /// Total chain volume below which volume ratios are not scored
    pub min_options_volume: u64,
    pub material_filing_score: f64,
    pub routine_filing_score: f64,
    pub material_filing_types: Vec<String>,
    pub routine_filing_types: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            attention_window_hours: 24,
            attention_saturation: 8.0,
            disclosure_window_hours: 72,
            breaking_keywords: to_strings(&[
                "breaking",
                "just announced",
                "just reported",
                "urgent",
                "soars",
                "plunges",
                "surges",
                "crashes",
                "halted",
                "fda approved",
                "settlement",
                "acquisition",
                "merger",
                "buyout",
                "recall",
            ]),
            news_wire_sources: to_strings(&[
                "reuters",
                "bloomberg",
                "associated press",
                "business wire",
                "pr newswire",
                "globenewswire",
                "dow jones",
            ]),
            short_expiry_days: 7,
            min_options_volume: 100,
            material_filing_score: 8.0,
            routine_filing_score: 4.0,
            material_filing_types: to_strings(&[
                "8-K", "8-K/A", "6-K", "SC 13D", "SC 13D/A", "SC TO-T", "S-4", "425", "DEFM14A",
            ]),
            routine_filing_types: to_strings(&[
                "10-Q", "10-K", "4", "SC 13G", "SC 13G/A", "S-1", "S-3", "DEF 14A",
            ]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Full PSI engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsiConfig {
    pub weights: CategoryWeights,
    pub tiers: TierThresholds,
    pub baseline: BaselineConfig,
    pub normalizer: NormalizerConfig,
    /// Re-alert interval while a ticker stays Critical
    pub cooldown_minutes: i64,
    /// Maximum Flash Reasons per alert
    pub flash_top_n: usize,
    /// Flash Reason titles are truncated to this many characters
    pub title_max_chars: usize,
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            tiers: TierThresholds::default(),
            baseline: BaselineConfig::default(),
            normalizer: NormalizerConfig::default(),
            cooldown_minutes: 120,
            flash_top_n: 3,
            title_max_chars: 160,
        }
    }
}

impl PsiConfig {
    /// Defaults overridden by `PSI_*` environment variables, then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let config = Self {
            weights: CategoryWeights {
                options: read(&lookup, "PSI_WEIGHT_OPTIONS", d.weights.options)?,
                attention: read(&lookup, "PSI_WEIGHT_ATTENTION", d.weights.attention)?,
                disclosure: read(&lookup, "PSI_WEIGHT_DISCLOSURE", d.weights.disclosure)?,
            },
            tiers: TierThresholds {
                watch: read(&lookup, "PSI_TIER_WATCH", d.tiers.watch)?,
                alert: read(&lookup, "PSI_TIER_ALERT", d.tiers.alert)?,
                critical: read(&lookup, "PSI_TIER_CRITICAL", d.tiers.critical)?,
            },
            baseline: BaselineConfig {
                window: read(&lookup, "PSI_BASELINE_WINDOW", d.baseline.window)?,
                min_stddev: read(&lookup, "PSI_BASELINE_MIN_STDDEV", d.baseline.min_stddev)?,
                z_cap: read(&lookup, "PSI_BASELINE_Z_CAP", d.baseline.z_cap)?,
                accelerated: d.baseline.accelerated,
            },
            normalizer: NormalizerConfig {
                attention_window_hours: read(
                    &lookup,
                    "PSI_ATTENTION_WINDOW_HOURS",
                    d.normalizer.attention_window_hours,
                )?,
                attention_saturation: read(
                    &lookup,
                    "PSI_ATTENTION_SATURATION",
                    d.normalizer.attention_saturation,
                )?,
                disclosure_window_hours: read(
                    &lookup,
                    "PSI_DISCLOSURE_WINDOW_HOURS",
                    d.normalizer.disclosure_window_hours,
                )?,
                short_expiry_days: read(&lookup, "PSI_SHORT_EXPIRY_DAYS", d.normalizer.short_expiry_days)?,
                material_filing_score: read(
                    &lookup,
                    "PSI_MATERIAL_FILING_SCORE",
                    d.normalizer.material_filing_score,
                )?,
                routine_filing_score: read(
                    &lookup,
                    "PSI_ROUTINE_FILING_SCORE",
                    d.normalizer.routine_filing_score,
                )?,
                ..d.normalizer
            },
            cooldown_minutes: read(&lookup, "PSI_ALERT_COOLDOWN_MINUTES", d.cooldown_minutes)?,
            flash_top_n: read(&lookup, "PSI_FLASH_TOP_N", d.flash_top_n)?,
            title_max_chars: read(&lookup, "PSI_FLASH_TITLE_MAX_CHARS", d.title_max_chars)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        for (name, value) in [
            ("options", w.options),
            ("attention", w.attention),
            ("disclosure", w.disclosure),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidWeights(format!(
                    "{} weight must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidWeights(format!(
                "weights must sum to 1.0, got {:.6}",
                w.sum()
            )));
        }

        let t = &self.tiers;
        let in_range = |v: f64| v.is_finite() && v > 0.0 && v <= 10.0;
        if !(in_range(t.watch) && in_range(t.alert) && in_range(t.critical)) {
            return Err(ConfigError::InvalidThresholds(format!(
                "thresholds must lie in (0, 10], got {}/{}/{}",
                t.watch, t.alert, t.critical
            )));
        }
        if !(t.watch < t.alert && t.alert < t.critical) {
            return Err(ConfigError::InvalidThresholds(format!(
                "thresholds must be strictly increasing, got {}/{}/{}",
                t.watch, t.alert, t.critical
            )));
        }

        let b = &self.baseline;
        if b.window < 2 {
            return Err(ConfigError::InvalidBaseline(format!(
                "window must hold at least 2 samples, got {}",
                b.window
            )));
        }
        if !b.min_stddev.is_finite() || b.min_stddev <= 0.0 {
            return Err(ConfigError::InvalidBaseline(format!(
                "min stddev must be positive, got {}",
                b.min_stddev
            )));
        }
        if !b.z_cap.is_finite() || b.z_cap <= 0.0 {
            return Err(ConfigError::InvalidBaseline(format!(
                "z cap must be positive, got {}",
                b.z_cap
            )));
        }

        if !(1..=MAX_COOLDOWN_MINUTES).contains(&self.cooldown_minutes) {
            return Err(ConfigError::InvalidCooldown(self.cooldown_minutes));
        }
        if self.flash_top_n == 0 {
            return Err(ConfigError::Invalid("flash top-N must be at least 1".to_string()));
        }
        if self.title_max_chars == 0 {
            return Err(ConfigError::Invalid("flash title length must be at least 1".to_string()));
        }

        let n = &self.normalizer;
        for (name, hours) in [
            ("attention", n.attention_window_hours),
            ("disclosure", n.disclosure_window_hours),
        ] {
            if !(1..=MAX_WINDOW_HOURS).contains(&hours) {
                return Err(ConfigError::Invalid(format!(
                    "{} window must be between 1 and {} hours, got {}",
                    name, MAX_WINDOW_HOURS, hours
                )));
            }
        }
        if !n.attention_saturation.is_finite() || n.attention_saturation <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "attention saturation must be positive, got {}",
                n.attention_saturation
            )));
        }
        if !(0..=MAX_SHORT_EXPIRY_DAYS).contains(&n.short_expiry_days) {
            return Err(ConfigError::Invalid(format!(
                "short expiry must be between 0 and {} days, got {}",
                MAX_SHORT_EXPIRY_DAYS, n.short_expiry_days
            )));
        }
        for score in [n.material_filing_score, n.routine_filing_score] {
            if !(0.0..=10.0).contains(&score) {
                return Err(ConfigError::Invalid(format!(
                    "filing scores must lie in [0, 10], got {}",
                    score
                )));
            }
        }

        Ok(())
    }
}

fn read<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            })
        }
        _ => Ok(default),
    }
}
