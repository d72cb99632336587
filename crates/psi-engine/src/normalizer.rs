//! Raw collector output -> dimensionless [0, 10] category scores.
//!
//! Each normalizer distinguishes "no data" (`score: None`) from "confirmed
//! calm" (`score: Some(0.0)`). Fusion relies on that difference.

use chrono::{DateTime, Duration, Utc};
use sentinel_core::{
    AttentionItem, ContractType, DisclosureItem, Evidence, OptionsContract, OptionsSnapshot,
    SignalCategory, SignalSample, SourceKind, WatchItem,
};
use statrs::statistics::Statistics;

use crate::config::NormalizerConfig;

/// Indicator scores at or above this value are reported as evidence
const OPTIONS_EVIDENCE_FLOOR: f64 = 3.0;
/// Minimum implied vols needed before a skew is meaningful
const MIN_IV_SAMPLES: usize = 5;

/// Linear ramp: 0 at `lo`, 10 at `hi`, clamped outside.
fn ramp(x: f64, lo: f64, hi: f64) -> f64 {
    if !x.is_finite() || x <= lo {
        0.0
    } else if x >= hi {
        10.0
    } else {
        (x - lo) / (hi - lo) * 10.0
    }
}

#[derive(Debug, Clone)]
struct Indicator {
    score: f64,
    label: String,
}

pub struct SignalNormalizer {
    config: NormalizerConfig,
}

impl SignalNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Options anomaly
    // ------------------------------------------------------------------

    /// Max of the sub-indicators, so one extreme reading is enough.
    pub fn normalize_options(
        &self,
        ticker: &str,
        snapshot: Option<&OptionsSnapshot>,
        now: DateTime<Utc>,
    ) -> SignalSample {
        let Some(snapshot) = snapshot.filter(|s| !s.contracts.is_empty()) else {
            return SignalSample::absent(ticker, SignalCategory::Options, now);
        };

        let total_volume: u64 = snapshot.contracts.iter().map(|c| c.volume).sum();
        if total_volume < self.config.min_options_volume.max(1) {
            return SignalSample {
                ticker: ticker.to_string(),
                category: SignalCategory::Options,
                score: Some(0.0),
                timestamp: now,
                evidence: Vec::new(),
            };
        }

        let mut indicators: Vec<Indicator> = [
            self.otm_imbalance(snapshot),
            self.short_expiry_concentration(snapshot, total_volume, now),
            open_interest_surge(&snapshot.contracts, total_volume),
            iv_skew(snapshot),
        ]
        .into_iter()
        .flatten()
        .collect();

        indicators.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let score = indicators.first().map(|i| i.score).unwrap_or(0.0).clamp(0.0, 10.0);

        let evidence = indicators
            .iter()
            .filter(|i| i.score >= OPTIONS_EVIDENCE_FLOOR)
            .map(|i| Evidence {
                title: format!("{} options: {}", ticker, i.label),
                source: snapshot.source.clone(),
                url: snapshot.url.clone().unwrap_or_default(),
                published_at: snapshot.as_of,
                kind: SourceKind::Other,
            })
            .collect();

        SignalSample {
            ticker: ticker.to_string(),
            category: SignalCategory::Options,
            score: Some(score),
            timestamp: now,
            evidence,
        }
    }

    /// Out-of-the-money call vs put volume, whichever side dominates
    fn otm_imbalance(&self, snapshot: &OptionsSnapshot) -> Option<Indicator> {
        let price = snapshot.underlying_price.filter(|p| *p > 0.0)?;
        let (calls, puts) = snapshot.contracts.iter().fold((0u64, 0u64), |(c, p), k| {
            match k.contract_type {
                ContractType::Call if k.strike > price => (c + k.volume, p),
                ContractType::Put if k.strike < price => (c, p + k.volume),
                _ => (c, p),
            }
        });
        if calls + puts < self.config.min_options_volume {
            return None;
        }
        let (hi, lo, side) = if calls >= puts {
            (calls, puts, "call")
        } else {
            (puts, calls, "put")
        };
        let ratio = hi as f64 / lo.max(1) as f64;
        Some(Indicator {
            score: ramp(ratio, 1.0, 6.0),
            label: format!("OTM {} volume {:.1}x the opposite side", side, ratio),
        })
    }

    /// Share of volume in contracts expiring within the short-expiry window
    fn short_expiry_concentration(
        &self,
        snapshot: &OptionsSnapshot,
        total_volume: u64,
        now: DateTime<Utc>,
    ) -> Option<Indicator> {
        let cutoff = now.date_naive() + Duration::days(self.config.short_expiry_days);
        let short: u64 = snapshot
            .contracts
            .iter()
            .filter(|c| c.expiry <= cutoff)
            .map(|c| c.volume)
            .sum();
        let share = short as f64 / total_volume as f64;
        Some(Indicator {
            score: ramp(share, 0.3, 0.9),
            label: format!(
                "{:.0}% of volume expires within {} days",
                share * 100.0,
                self.config.short_expiry_days
            ),
        })
    }

    // ------------------------------------------------------------------
    // Attention
    // ------------------------------------------------------------------

    /// Recency-weighted count of matching news items and filings,
    /// saturated into [0, 10].
    ///
    /// `items: None` means the news feed was unavailable and the category is
    /// absent. Filings are fetched per ticker, so every qualifying filing in
    /// the attention window counts as a match.
    pub fn normalize_attention(
        &self,
        watch: &WatchItem,
        items: Option<&[AttentionItem]>,
        filings: Option<&[DisclosureItem]>,
        now: DateTime<Utc>,
    ) -> SignalSample {
        let Some(items) = items else {
            return SignalSample::absent(&watch.ticker, SignalCategory::Attention, now);
        };

        let window_start = now - Duration::hours(self.config.attention_window_hours);
        let in_window = |at: DateTime<Utc>| at >= window_start && at <= now + Duration::minutes(5);

        let mut seen_urls = std::collections::HashSet::new();
        let mut relevant: Vec<(Evidence, f64)> = items
            .iter()
            .filter(|item| in_window(item.published_at))
            .filter(|item| !item.matched_keywords.is_empty() || !watch.matched_terms(&item.title).is_empty())
            .filter(|&item| item.url.is_empty() || seen_urls.insert(item.url.as_str()))
            .map(|item| {
                let evidence = Evidence {
                    title: item.title.clone(),
                    source: item.source.clone(),
                    url: item.url.clone(),
                    published_at: item.published_at,
                    kind: self.source_kind(&item.source),
                };
                (evidence, self.item_weight(&item.title, item.published_at, now))
            })
            .collect();

        relevant.extend(
            filings
                .unwrap_or_default()
                .iter()
                .filter(|f| in_window(f.filed_at) && self.filing_class(f).is_some())
                .filter(|&f| f.url.is_empty() || seen_urls.insert(f.url.as_str()))
                .map(|f| {
                    let weight = self.item_weight("", f.filed_at, now);
                    (filing_evidence(f), weight)
                }),
        );

        let weighted: f64 = relevant.iter().map(|(_, w)| w).sum();
        let score = 10.0 * (1.0 - (-weighted / self.config.attention_saturation).exp());

        relevant.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.published_at.cmp(&a.0.published_at))
        });

        SignalSample {
            ticker: watch.ticker.clone(),
            category: SignalCategory::Attention,
            score: Some(score.clamp(0.0, 10.0)),
            timestamp: now,
            evidence: relevant.into_iter().map(|(e, _)| e).collect(),
        }
    }

    fn item_weight(&self, title: &str, published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - published_at).num_minutes().max(0) as f64 / 60.0;
        let recency = if age_hours <= 1.0 {
            1.0
        } else if age_hours <= 6.0 {
            0.75
        } else if age_hours <= 12.0 {
            0.5
        } else {
            0.25
        };
        let title = title.to_lowercase();
        let breaking = self
            .config
            .breaking_keywords
            .iter()
            .any(|kw| title.contains(&kw.to_lowercase()));
        if breaking {
            recency * 1.5
        } else {
            recency
        }
    }

    pub fn source_kind(&self, source: &str) -> SourceKind {
        let source = source.to_lowercase();
        if source.contains("sec edgar") || source.contains("sec.gov") {
            SourceKind::RegulatoryFiling
        } else if self
            .config
            .news_wire_sources
            .iter()
            .any(|wire| source.contains(wire.as_str()))
        {
            SourceKind::NewsWire
        } else {
            SourceKind::Other
        }
    }

    // ------------------------------------------------------------------
    // Disclosure
    // ------------------------------------------------------------------

    /// `Some(true)` for material forms, `Some(false)` for routine ones,
    /// `None` when the form does not qualify.
    fn filing_class(&self, filing: &DisclosureItem) -> Option<bool> {
        let form = filing.filing_type.trim().to_uppercase();
        if contains_form(&self.config.material_filing_types, &form) {
            Some(true)
        } else if contains_form(&self.config.routine_filing_types, &form) {
            Some(false)
        } else {
            None
        }
    }

    /// Presence of a qualifying filing is the signal: flat material or
    /// routine score, 0 when the feed returned nothing that qualifies.
    pub fn normalize_disclosure(
        &self,
        ticker: &str,
        filings: Option<&[DisclosureItem]>,
        now: DateTime<Utc>,
    ) -> SignalSample {
        let Some(filings) = filings else {
            return SignalSample::absent(ticker, SignalCategory::Disclosure, now);
        };

        let window_start = now - Duration::hours(self.config.disclosure_window_hours);
        let mut qualifying: Vec<(&DisclosureItem, bool)> = filings
            .iter()
            .filter(|f| f.filed_at >= window_start)
            .filter_map(|f| self.filing_class(f).map(|material| (f, material)))
            .collect();

        let score = if qualifying.iter().any(|(_, material)| *material) {
            self.config.material_filing_score
        } else if !qualifying.is_empty() {
            self.config.routine_filing_score
        } else {
            0.0
        };

        // material first, then newest
        qualifying.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.filed_at.cmp(&a.0.filed_at)));

        let evidence = qualifying.iter().map(|(f, _)| filing_evidence(f)).collect();

        SignalSample {
            ticker: ticker.to_string(),
            category: SignalCategory::Disclosure,
            score: Some(score.clamp(0.0, 10.0)),
            timestamp: now,
            evidence,
        }
    }
}

fn contains_form(list: &[String], form: &str) -> bool {
    list.iter().any(|f| f.eq_ignore_ascii_case(form))
}

fn filing_evidence(f: &DisclosureItem) -> Evidence {
    Evidence {
        title: format!(
            "[SEC {}] {}",
            f.filing_type.trim(),
            f.title.as_deref().unwrap_or("filing")
        ),
        source: "SEC EDGAR".to_string(),
        url: f.url.clone(),
        published_at: f.filed_at,
        kind: SourceKind::RegulatoryFiling,
    }
}

/// Day volume relative to standing open interest
fn open_interest_surge(contracts: &[OptionsContract], total_volume: u64) -> Option<Indicator> {
    let open_interest: u64 = contracts.iter().map(|c| c.open_interest).sum();
    if open_interest == 0 {
        return None;
    }
    let ratio = total_volume as f64 / open_interest as f64;
    Some(Indicator {
        score: ramp(ratio, 0.5, 3.0),
        label: format!("volume at {:.1}x open interest", ratio),
    })
}

/// OTM call implied vol against the chain-wide distribution, in sigmas
fn iv_skew(snapshot: &OptionsSnapshot) -> Option<Indicator> {
    let price = snapshot.underlying_price.filter(|p| *p > 0.0)?;
    let all: Vec<f64> = snapshot
        .contracts
        .iter()
        .filter_map(|c| c.implied_vol)
        .filter(|iv| iv.is_finite() && *iv > 0.0)
        .collect();
    let otm_calls: Vec<f64> = snapshot
        .contracts
        .iter()
        .filter(|c| c.contract_type == ContractType::Call && c.strike > price)
        .filter_map(|c| c.implied_vol)
        .filter(|iv| iv.is_finite() && *iv > 0.0)
        .collect();
    if all.len() < MIN_IV_SAMPLES || otm_calls.is_empty() {
        return None;
    }

    let std_dev = all.iter().population_std_dev();
    if std_dev.is_nan() || std_dev <= 0.0 {
        return None;
    }
    let z = (otm_calls.iter().mean() - all.iter().mean()) / std_dev;
    Some(Indicator {
        score: ramp(z.abs(), 1.0, 3.0),
        label: format!("OTM call IV skew {:+.1} sigma", z),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-13T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn normalizer() -> SignalNormalizer {
        SignalNormalizer::new(NormalizerConfig::default())
    }

    fn amat() -> WatchItem {
        WatchItem {
            ticker: "AMAT".to_string(),
            name: "Applied Materials".to_string(),
            sector: "Semiconductor Equipment".to_string(),
            related: vec!["LRCX".to_string()],
            keywords: vec!["export control".to_string()],
        }
    }

    fn contract(kind: ContractType, strike: f64, days: i64, volume: u64, oi: u64, iv: f64) -> OptionsContract {
        OptionsContract {
            contract_type: kind,
            strike,
            expiry: now().date_naive() + Duration::days(days),
            volume,
            open_interest: oi,
            implied_vol: Some(iv),
        }
    }

    fn snapshot(contracts: Vec<OptionsContract>) -> OptionsSnapshot {
        OptionsSnapshot {
            ticker: "AMAT".to_string(),
            underlying_price: Some(200.0),
            as_of: now(),
            source: "polygon".to_string(),
            url: None,
            contracts,
        }
    }

    #[test]
    fn test_ramp() {
        assert_eq!(ramp(0.5, 1.0, 6.0), 0.0);
        assert_eq!(ramp(3.5, 1.0, 6.0), 5.0);
        assert_eq!(ramp(9.0, 1.0, 6.0), 10.0);
        assert_eq!(ramp(f64::NAN, 1.0, 6.0), 0.0);
    }

    #[test]
    fn test_options_unavailable_is_absent() {
        let n = normalizer();
        assert_eq!(n.normalize_options("AMAT", None, now()).score, None);
        let empty = snapshot(vec![]);
        assert_eq!(n.normalize_options("AMAT", Some(&empty), now()).score, None);
    }

    #[test]
    fn test_options_no_volume_is_calm() {
        let chain = snapshot(vec![contract(ContractType::Call, 220.0, 30, 0, 500, 0.4)]);
        assert_eq!(normalizer().normalize_options("AMAT", Some(&chain), now()).score, Some(0.0));
    }

    #[test]
    fn test_options_single_extreme_indicator_dominates() {
        // heavy short-dated OTM call buying against little put interest
        let chain = snapshot(vec![
            contract(ContractType::Call, 220.0, 2, 5_000, 20_000, 0.40),
            contract(ContractType::Call, 210.0, 30, 200, 20_000, 0.40),
            contract(ContractType::Put, 180.0, 30, 500, 20_000, 0.40),
            contract(ContractType::Put, 170.0, 30, 100, 20_000, 0.40),
            contract(ContractType::Call, 190.0, 30, 100, 20_000, 0.40),
        ]);
        let sample = normalizer().normalize_options("AMAT", Some(&chain), now());
        assert_eq!(sample.score, Some(10.0));
        assert!(!sample.evidence.is_empty());
        assert!(sample.evidence[0].title.starts_with("AMAT options:"));
    }

    #[test]
    fn test_options_quiet_chain_scores_low() {
        let chain = snapshot(vec![
            contract(ContractType::Call, 220.0, 45, 300, 10_000, 0.35),
            contract(ContractType::Put, 180.0, 45, 300, 10_000, 0.36),
            contract(ContractType::Call, 200.0, 45, 300, 10_000, 0.34),
            contract(ContractType::Put, 200.0, 45, 300, 10_000, 0.35),
            contract(ContractType::Call, 230.0, 45, 300, 10_000, 0.35),
        ]);
        let sample = normalizer().normalize_options("AMAT", Some(&chain), now());
        let score = sample.score.unwrap();
        assert!(score < 3.0, "score {}", score);
        assert!(sample.evidence.is_empty());
    }

    fn news(title: &str, hours_ago: i64, source: &str) -> AttentionItem {
        AttentionItem {
            title: title.to_string(),
            source: source.to_string(),
            url: format!("https://news.example.com/{}", title.len() + hours_ago as usize),
            published_at: now() - Duration::hours(hours_ago),
            matched_keywords: vec![],
        }
    }

    #[test]
    fn test_attention_absent_vs_calm() {
        let n = normalizer();
        assert_eq!(n.normalize_attention(&amat(), None, None, now()).score, None);
        assert_eq!(n.normalize_attention(&amat(), Some(&[]), None, now()).score, Some(0.0));
    }

    #[test]
    fn test_attention_filters_irrelevant_and_stale() {
        let items = vec![
            news("Applied Materials wins HBM order", 0, "Reuters"),
            news("Unrelated chip story", 0, "Reuters"),
            news("AMAT beats estimates", 48, "Reuters"),
        ];
        let sample = normalizer().normalize_attention(&amat(), Some(&items), None, now());
        assert_eq!(sample.evidence.len(), 1);
        assert_eq!(sample.evidence[0].kind, SourceKind::NewsWire);
        let expected = 10.0 * (1.0 - (-1.0f64 / 8.0).exp());
        assert!((sample.score.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_attention_recency_and_breaking_weight() {
        let n = normalizer();
        let fresh = vec![news("BREAKING: AMAT halted", 0, "blog")];
        let stale = vec![news("AMAT update", 20, "blog")];
        let a = n.normalize_attention(&amat(), Some(&fresh), None, now()).score.unwrap();
        let b = n.normalize_attention(&amat(), Some(&stale), None, now()).score.unwrap();
        assert!(a > b);
    }

    #[test]
    fn test_attention_is_bounded() {
        let items: Vec<AttentionItem> = (0..500)
            .map(|i| AttentionItem {
                url: format!("https://x.example.com/{}", i),
                ..news("breaking AMAT", 0, "wire")
            })
            .collect();
        let score = normalizer().normalize_attention(&amat(), Some(&items), None, now()).score.unwrap();
        assert!(score <= 10.0 && score > 9.9);
    }

    fn filing(form: &str, hours_ago: i64) -> DisclosureItem {
        DisclosureItem {
            filing_type: form.to_string(),
            filed_at: now() - Duration::hours(hours_ago),
            url: format!("https://www.sec.gov/{}/{}", form, hours_ago),
            title: Some("Applied Materials Inc".to_string()),
        }
    }

    #[test]
    fn test_disclosure_flat_scores() {
        let n = normalizer();
        let material = vec![filing("10-Q", 2), filing("8-K", 5)];
        let sample = n.normalize_disclosure("AMAT", Some(&material), now());
        assert_eq!(sample.score, Some(8.0));
        assert!(sample.evidence[0].title.starts_with("[SEC 8-K]"));
        assert_eq!(sample.evidence[0].kind, SourceKind::RegulatoryFiling);

        let routine = vec![filing("4", 2)];
        assert_eq!(n.normalize_disclosure("AMAT", Some(&routine), now()).score, Some(4.0));

        let stale = vec![filing("8-K", 200)];
        assert_eq!(n.normalize_disclosure("AMAT", Some(&stale), now()).score, Some(0.0));

        assert_eq!(n.normalize_disclosure("AMAT", None, now()).score, None);
    }

    #[test]
    fn test_unknown_form_does_not_qualify() {
        let filings = vec![filing("CORRESP", 1)];
        let sample = normalizer().normalize_disclosure("AMAT", Some(&filings), now());
        assert_eq!(sample.score, Some(0.0));
        assert!(sample.evidence.is_empty());
    }

    #[test]
    fn test_filings_raise_attention_without_news() {
        let n = normalizer();
        let filings = vec![filing("8-K", 0), filing("4", 3), filing("CORRESP", 0), filing("10-Q", 48)];

        let sample = n.normalize_attention(&amat(), Some(&[]), Some(&filings), now());
        // 8-K within the hour (1.0) + Form 4 three hours old (0.75)
        let expected = 10.0 * (1.0 - (-1.75f64 / 8.0).exp());
        assert!((sample.score.unwrap() - expected).abs() < 1e-9);
        assert_eq!(sample.evidence.len(), 2);
        assert!(sample.evidence.iter().all(|e| e.kind == SourceKind::RegulatoryFiling));

        // the news feed decides availability
        assert_eq!(n.normalize_attention(&amat(), None, Some(&filings), now()).score, None);
    }

    #[test]
    fn test_filings_add_to_news_count() {
        let n = normalizer();
        let items = vec![news("Applied Materials wins HBM order", 0, "Reuters")];
        let filings = vec![filing("8-K", 0)];
        let news_only = n.normalize_attention(&amat(), Some(&items), None, now()).score.unwrap();
        let both = n.normalize_attention(&amat(), Some(&items), Some(&filings), now()).score.unwrap();
        assert!(both > news_only);
    }

    #[test]
    fn test_short_expiry_boundary_is_inclusive() {
        // balanced OTM volume, low volume/OI, too few IVs for skew:
        // only the short-expiry share can score
        let chain = |days: i64| {
            snapshot(vec![
                contract(ContractType::Call, 220.0, days, 300, 10_000, 0.35),
                contract(ContractType::Put, 180.0, days, 300, 10_000, 0.35),
            ])
        };
        let n = normalizer();
        let days = n.config().short_expiry_days;

        let on_boundary = n.normalize_options("AMAT", Some(&chain(days)), now());
        assert_eq!(on_boundary.score, Some(10.0));
        assert!(on_boundary.evidence[0].title.contains("expires within 7 days"));

        let past_boundary = n.normalize_options("AMAT", Some(&chain(days + 1)), now());
        assert_eq!(past_boundary.score, Some(0.0));
        assert!(past_boundary.evidence.is_empty());
    }
}
