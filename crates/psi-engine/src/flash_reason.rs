//! Flash Reason attribution: which evidence explains an escalation.

use std::cmp::Ordering;
use std::collections::HashSet;

use sentinel_core::{
    contains_term, sanitize_text, Classification, Evidence, EventClass, EventType, FlashReason,
    FlashReport, PriceSnapshot, SignalCategory, SignalSample, SourceKind,
};

use crate::fusion::FusedScore;

const SOURCE_MAX_CHARS: usize = 48;
/// |price change| in percent that counts as a directional move
const PRICE_MOVE_PCT: f64 = 2.0;

const EVENT_VOCABULARY: &[(EventType, &[&str])] = &[
    (EventType::Earnings, &["earnings", "eps", "revenue", "quarter", "fiscal", "guidance"]),
    (
        EventType::Regulatory,
        &["bis", "fda", "ftc", "doj", "sec", "settlement", "export", "sanction", "penalty", "entity list"],
    ),
    (
        EventType::SupplyChain,
        &["tsmc", "samsung", "foundry", "fab", "capex", "supplier", "equipment order"],
    ),
    (
        EventType::Analyst,
        &["upgrade", "downgrade", "price target", "rating", "overweight", "underweight", "analyst"],
    ),
    (
        EventType::MergerAcquisition,
        &["acquisition", "acquire", "merger", "buyout", "deal", "partnership"],
    ),
    (EventType::Sector, &["semiconductor", "chip", "chips", "sector", "etf", "industry"]),
    (EventType::Macro, &["fed", "fomc", "inflation", "tariff", "tariffs", "trade war", "cpi"]),
];

const NEGATIVE_TERMS: &[&str] = &[
    "lawsuit", "sued", "recall", "fraud", "investigation", "downgrade", "ban", "sanction",
    "penalty", "fine", "layoff", "layoffs", "cut", "cuts", "miss", "misses", "disappointing", "weak",
];

const POSITIVE_TERMS: &[&str] = &[
    "beat", "beats", "raise", "raises", "upgrade", "approved", "deal", "contract", "partnership",
    "record", "strong", "guidance above", "upside", "outperform",
];

const BEAT_TERMS: &[&str] = &["beat", "beats", "topped", "exceeded", "surpassed", "above estimate"];

const GUIDE_DOWN_TERMS: &[&str] = &[
    "guidance below",
    "guide down",
    "guides down",
    "lowered guidance",
    "cut guidance",
    "cuts guidance",
    "reduced outlook",
    "below expectations",
    "disappointing guidance",
    "weak guidance",
    "outlook miss",
    "falls despite",
    "drops despite",
    "despite beat",
    "despite strong",
];

/// Classifies a headline by its first matching vocabulary.
pub fn event_type(title: &str) -> EventType {
    let title = title.to_lowercase();
    EVENT_VOCABULARY
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| contains_term(&title, t)))
        .map(|(kind, _)| *kind)
        .unwrap_or(EventType::Other)
}

struct Candidate<'a> {
    evidence: &'a Evidence,
    category: SignalCategory,
    key: f64,
}

pub struct FlashReasonAttributor {
    top_n: usize,
    title_max_chars: usize,
}

impl FlashReasonAttributor {
    pub fn new(top_n: usize, title_max_chars: usize) -> Self {
        Self {
            top_n,
            title_max_chars,
        }
    }

    /// Ranks evidence across all categories and keeps the top N.
    ///
    /// Order: category contribution (effective weight x score) desc, then
    /// recency desc, then source priority. Items are deduplicated by URL
    /// (by title when the URL is empty). Returns fewer than N, possibly
    /// zero, when little evidence exists.
    pub fn attribute(
        &self,
        samples: &[SignalSample],
        fused: &FusedScore,
        price: Option<&PriceSnapshot>,
    ) -> FlashReport {
        let mut candidates: Vec<Candidate> = samples
            .iter()
            .filter(|s| s.is_present())
            .flat_map(|s| {
                let key = fused.contribution(s.category);
                s.evidence.iter().map(move |evidence| Candidate {
                    evidence,
                    category: s.category,
                    key,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.key
                .partial_cmp(&a.key)
                .unwrap_or(Ordering::Equal)
                .then(b.evidence.published_at.cmp(&a.evidence.published_at))
                .then(b.evidence.kind.priority().cmp(&a.evidence.kind.priority()))
        });

        let mut seen = HashSet::new();
        let selected: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| {
                let dedup_key = if c.evidence.url.is_empty() {
                    c.evidence.title.trim().to_lowercase()
                } else {
                    c.evidence.url.clone()
                };
                seen.insert(dedup_key)
            })
            .take(self.top_n)
            .collect();

        let total_evidence = samples.iter().map(|s| s.evidence.len()).sum();
        let classification = classify(&selected, total_evidence, price);

        let reasons = selected
            .iter()
            .enumerate()
            .map(|(i, c)| FlashReason {
                rank: i + 1,
                title: sanitize_text(&c.evidence.title, self.title_max_chars),
                source: sanitize_text(&c.evidence.source, SOURCE_MAX_CHARS),
                url: c.evidence.url.clone(),
                category: c.category,
                source_kind: c.evidence.kind,
                event_type: event_type(&c.evidence.title),
                published_at: c.evidence.published_at,
            })
            .collect();

        FlashReport {
            reasons,
            classification,
        }
    }
}

fn any_term(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| contains_term(text, t))
}

/// Catalyst / Fracture / Noise from the selected headlines and price direction
fn classify(selected: &[&Candidate], total_evidence: usize, price: Option<&PriceSnapshot>) -> Classification {
    if selected.is_empty() {
        return Classification {
            class: EventClass::Unknown,
            confidence: 0.0,
            reasoning: "no evidence captured".to_string(),
        };
    }

    let titles: Vec<String> = selected.iter().map(|c| c.evidence.title.to_lowercase()).collect();
    let facts = selected
        .iter()
        .filter(|c| c.evidence.kind == SourceKind::RegulatoryFiling)
        .count();
    let positives = titles.iter().filter(|t| any_term(t, POSITIVE_TERMS)).count();
    let negatives = titles.iter().filter(|t| any_term(t, NEGATIVE_TERMS)).count();

    let change = price.map(|p| p.change_pct).filter(|c| c.is_finite()).unwrap_or(0.0);
    let direction = if change <= -PRICE_MOVE_PCT {
        -1
    } else if change >= PRICE_MOVE_PCT {
        1
    } else {
        0
    };

    let has_beat = titles.iter().any(|t| any_term(t, BEAT_TERMS));
    let has_guide_down = titles.iter().any(|t| GUIDE_DOWN_TERMS.iter().any(|g| t.contains(g)));

    let verdict = |class: EventClass, confidence: f64, reasoning: String| Classification {
        class,
        confidence,
        reasoning,
    };

    if has_guide_down || (has_beat && direction < 0) {
        return verdict(
            EventClass::Fracture,
            0.9,
            "beat overshadowed by weak guidance or a falling price".to_string(),
        );
    }
    if direction < 0 && (facts >= 1 || total_evidence >= 3) {
        return verdict(
            EventClass::Fracture,
            if facts >= 1 { 0.85 } else { 0.7 },
            format!("price {:+.1}% with {} evidence items", change, total_evidence),
        );
    }
    if direction > 0 && (facts >= 1 || positives >= 1) {
        return verdict(
            EventClass::Catalyst,
            if facts >= 1 { 0.85 } else { 0.7 },
            format!("price {:+.1}% backed by filings or positive news", change),
        );
    }
    if facts >= 1 && negatives >= 1 && positives == 0 {
        return verdict(
            EventClass::Fracture,
            0.8,
            format!("{} filing(s) with negative headlines", facts),
        );
    }
    if facts >= 1 && positives >= 1 {
        return verdict(
            EventClass::Catalyst,
            0.85,
            format!("{} filing(s) with positive headlines", facts),
        );
    }
    if positives > negatives && total_evidence >= 5 {
        return verdict(
            EventClass::Catalyst,
            0.7,
            format!("{} positive vs {} negative headlines on heavy flow", positives, negatives),
        );
    }
    if negatives > positives {
        return verdict(
            EventClass::Fracture,
            0.65,
            format!("{} negative vs {} positive headlines", negatives, positives),
        );
    }

    verdict(
        EventClass::Noise,
        0.5,
        "weak factual backing and no clear direction".to_string(),
    )
}
