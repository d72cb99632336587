use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::markdown::contains_term;

/// A watched equity, loaded from the watchlist file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchItem {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub sector: String,
    /// Tickers whose news also moves this one (suppliers, peers, ETFs)
    #[serde(default)]
    pub related: Vec<String>,
    /// Attention keywords (products, regulators, programs)
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl WatchItem {
    /// Returns the watch terms that occur in `text` (case-insensitive, whole words).
    ///
    /// The ticker, display name, related tickers and keywords are all candidate terms.
    pub fn matched_terms(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        std::iter::once(&self.ticker)
            .chain(std::iter::once(&self.name))
            .chain(self.related.iter())
            .chain(self.keywords.iter())
            .filter(|term| !term.trim().is_empty())
            .filter(|term| contains_term(&haystack, &term.to_lowercase()))
            .cloned()
            .collect()
    }
}

/// The three scored signal categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalCategory {
    Options,
    Attention,
    Disclosure,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 3] = [
        SignalCategory::Options,
        SignalCategory::Attention,
        SignalCategory::Disclosure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Options => "options",
            SignalCategory::Attention => "attention",
            SignalCategory::Disclosure => "disclosure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "options" => Some(SignalCategory::Options),
            "attention" => Some(SignalCategory::Attention),
            "disclosure" => Some(SignalCategory::Disclosure),
            _ => None,
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a piece of evidence came from, in tie-break priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    RegulatoryFiling,
    NewsWire,
    Other,
}

impl SourceKind {
    /// Higher wins ties: regulatory filing > primary news wire > other
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::RegulatoryFiling => 2,
            SourceKind::NewsWire => 1,
            SourceKind::Other => 0,
        }
    }
}

/// One item backing a category score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub kind: SourceKind,
}

/// Normalized output of one collector for one ticker in one scan cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSample {
    pub ticker: String,
    pub category: SignalCategory,
    /// `None` means not scored (no data), which is distinct from a confirmed-calm `Some(0.0)`
    pub score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Ordered most relevant first
    pub evidence: Vec<Evidence>,
}

impl SignalSample {
    pub fn absent(ticker: &str, category: SignalCategory, timestamp: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.to_string(),
            category,
            score: None,
            timestamp,
            evidence: Vec::new(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.score.is_some()
    }
}

// ---------------------------------------------------------------------------
// Raw collector inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Call,
    Put,
}

/// One row of an options chain snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsContract {
    pub contract_type: ContractType,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub volume: u64,
    pub open_interest: u64,
    pub implied_vol: Option<f64>,
}

/// Per-ticker options chain snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsSnapshot {
    pub ticker: String,
    pub underlying_price: Option<f64>,
    pub as_of: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub url: Option<String>,
    pub contracts: Vec<OptionsContract>,
}

/// A news or social item in the trailing attention window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionItem {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
}

/// A regulatory or corporate disclosure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclosureItem {
    pub filing_type: String,
    pub filed_at: DateTime<Utc>,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Price context; enrichment only, never a scoring category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub ticker: String,
    pub last: f64,
    pub change_pct: f64,
    /// Today's volume relative to the previous session
    pub volume_ratio: Option<f64>,
    pub as_of: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scoring output
// ---------------------------------------------------------------------------

/// Alert tier, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Normal,
    Watch,
    Alert,
    Critical,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::Watch => "watch",
            Tier::Alert => "alert",
            Tier::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Tier::Normal),
            "watch" => Some(Tier::Watch),
            "alert" => Some(Tier::Alert),
            "critical" => Some(Tier::Critical),
            _ => None,
        }
    }

    /// Colored marker used in chat messages and the cycle log
    pub fn marker(&self) -> &'static str {
        match self {
            Tier::Normal => "🟢",
            Tier::Watch => "🟡",
            Tier::Alert => "🟠",
            Tier::Critical => "🔴",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One category's share of a composite score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: SignalCategory,
    /// Normalizer output before baselining
    pub raw: Option<f64>,
    /// Fusion input (acceleration for baselined categories)
    pub score: Option<f64>,
    pub base_weight: f64,
    /// Weight after renormalizing over present categories; 0 when absent
    pub effective_weight: f64,
    /// `effective_weight * score`
    pub contribution: f64,
}

/// Pre-signal Index for one ticker in one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsiResult {
    pub ticker: String,
    pub composite: f64,
    pub categories: Vec<CategoryScore>,
    pub tier: Tier,
    pub timestamp: DateTime<Utc>,
}

impl PsiResult {
    pub fn category(&self, category: SignalCategory) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Coarse subject of a headline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Earnings,
    Regulatory,
    SupplyChain,
    Analyst,
    MergerAcquisition,
    Sector,
    Macro,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Earnings => "earnings",
            EventType::Regulatory => "regulatory",
            EventType::SupplyChain => "supply_chain",
            EventType::Analyst => "analyst",
            EventType::MergerAcquisition => "m&a",
            EventType::Sector => "sector",
            EventType::Macro => "macro",
            EventType::Other => "other",
        }
    }
}

/// One ranked, sanitized reason attributed to an escalation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashReason {
    pub rank: usize,
    /// Markdown-escaped; safe to embed in formatted text as-is
    pub title: String,
    /// Markdown-escaped source label
    pub source: String,
    pub url: String,
    pub category: SignalCategory,
    pub source_kind: SourceKind,
    pub event_type: EventType,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventClass {
    /// Fact-backed move likely to re-rate the stock upward
    Catalyst,
    /// Fact-backed break in the thesis (downside)
    Fracture,
    /// Attention without facts behind it
    Noise,
    Unknown,
}

impl EventClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::Catalyst => "Catalyst",
            EventClass::Fracture => "Fracture",
            EventClass::Noise => "Noise",
            EventClass::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub class: EventClass,
    pub confidence: f64,
    pub reasoning: String,
}

/// Flash Reason attribution for one escalated ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashReport {
    pub reasons: Vec<FlashReason>,
    pub classification: Classification,
}

/// Structured message handed to the notifier for one escalated ticker.
///
/// Text fields are pre-sanitized; the notifier owns all transport markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub ticker: String,
    pub name: String,
    pub tier: Tier,
    pub previous_tier: Option<Tier>,
    pub composite_score: f64,
    pub categories: Vec<CategoryScore>,
    pub reasons: Vec<FlashReason>,
    pub classification: Option<Classification>,
    pub price: Option<PriceSnapshot>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amat() -> WatchItem {
        WatchItem {
            ticker: "AMAT".to_string(),
            name: "Applied Materials".to_string(),
            sector: "Semiconductor Equipment".to_string(),
            related: vec!["ASML".to_string(), "LRCX".to_string()],
            keywords: vec!["export control".to_string(), "HBM".to_string()],
        }
    }

    #[test]
    fn test_matched_terms_whole_words() {
        let item = amat();
        let matched = item.matched_terms("BIS tightens export control rules; AMAT and ASML fall");
        assert!(matched.contains(&"AMAT".to_string()));
        assert!(matched.contains(&"ASML".to_string()));
        assert!(matched.contains(&"export control".to_string()));
        // "HBM" must not match inside another token
        assert!(item.matched_terms("HBMX launches").is_empty());
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Normal < Tier::Watch);
        assert!(Tier::Watch < Tier::Alert);
        assert!(Tier::Alert < Tier::Critical);
        assert_eq!(Tier::parse("CRITICAL"), Some(Tier::Critical));
        assert_eq!(Tier::parse("bogus"), None);
    }

    #[test]
    fn test_source_priority() {
        assert!(SourceKind::RegulatoryFiling.priority() > SourceKind::NewsWire.priority());
        assert!(SourceKind::NewsWire.priority() > SourceKind::Other.priority());
    }
}
