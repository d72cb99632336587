//! Chat message rendering (Telegram MarkdownV2, also valid Discord markdown).
//!
//! Every dynamic value passes through [`escape_markdown`] except Flash
//! Reason titles and sources, which arrive pre-escaped.

use sentinel_core::{escape_markdown, AlertMessage, EventClass, SignalCategory, Tier};

use crate::{Notification, SummaryRow};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━";
const NO_EVIDENCE: &str = "score elevated, no specific evidence captured";

pub struct MessageTemplate;

impl MessageTemplate {
    pub fn render(notification: &Notification) -> String {
        match notification {
            Notification::PreSignal(alert) => render_alert(alert),
            Notification::ScanFailure { ticker, error } => render_failure(ticker, error),
            Notification::DailySummary { date, rows } => render_summary(date, rows),
        }
    }

    /// One-line heading used as the Discord embed title
    pub fn title(notification: &Notification) -> String {
        match notification {
            Notification::PreSignal(alert) => format!(
                "{} {}: {} (PSI {:.1})",
                alert.tier.marker(),
                alert.ticker,
                alert.tier.as_str().to_uppercase(),
                alert.composite_score
            ),
            Notification::ScanFailure { ticker, .. } => format!("⚠️ Scan failure: {}", ticker),
            Notification::DailySummary { date, .. } => format!("📋 Sentinel daily summary {}", date),
        }
    }
}

fn esc(text: impl AsRef<str>) -> String {
    escape_markdown(text.as_ref())
}

/// Only `)` and `\` need escaping inside a MarkdownV2 link target
fn link_target(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}

fn class_marker(class: EventClass) -> &'static str {
    match class {
        EventClass::Catalyst => "🟢",
        EventClass::Fracture => "🔴",
        EventClass::Noise => "⚠️",
        EventClass::Unknown => "❓",
    }
}

fn render_alert(alert: &AlertMessage) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "{} *SENTINEL ALERT: {}*",
        alert.tier.marker(),
        esc(&alert.ticker)
    ));
    if !alert.name.is_empty() {
        lines.push(esc(&alert.name));
    }
    lines.push(RULE.to_string());

    let mut headline = format!(
        "📊 *PSI {}/10* {}",
        esc(format!("{:.1}", alert.composite_score)),
        esc(format!("[{}]", alert.tier.as_str().to_uppercase()))
    );
    match alert.previous_tier {
        Some(prev) if prev < alert.tier && prev > Tier::Normal => {
            headline.push_str(&format!(" up from {}", prev.as_str()));
        }
        Some(Tier::Critical) if alert.tier == Tier::Critical => headline.push_str(" still critical"),
        _ => {}
    }
    lines.push(headline);

    if let Some(c) = &alert.classification {
        lines.push(format!(
            "🏷️ {} *{}* {}: {}",
            class_marker(c.class),
            c.class.as_str(),
            esc(format!("({:.0}%)", c.confidence * 100.0)),
            esc(&c.reasoning)
        ));
    }

    let breakdown: Vec<String> = SignalCategory::ALL
        .iter()
        .map(|cat| {
            let value = alert
                .categories
                .iter()
                .find(|c| c.category == *cat)
                .and_then(|c| c.score)
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "n/a".to_string());
            format!("{} {}", capitalize(cat.as_str()), esc(value))
        })
        .collect();
    lines.push(breakdown.join(" · "));

    if let Some(price) = &alert.price {
        let mut line = format!(
            "💹 {} {}",
            esc(format!("${:.2}", price.last)),
            esc(format!("({:+.2}%)", price.change_pct))
        );
        if let Some(ratio) = price.volume_ratio {
            line.push_str(&format!(" vol x{}", esc(format!("{:.1}", ratio))));
        }
        lines.push(line);
    }

    lines.push(String::new());
    lines.push("🔍 *Top reasons:*".to_string());
    if alert.reasons.is_empty() {
        lines.push(format!("  {}", esc(NO_EVIDENCE)));
    } else {
        for reason in &alert.reasons {
            lines.push(format!(
                "{} {} {}",
                esc(format!("{}.", reason.rank)),
                esc(format!("[{}]", reason.event_type.as_str())),
                reason.title
            ));
            if reason.url.is_empty() {
                lines.push(format!("   {}", reason.source));
            } else {
                lines.push(format!("   🔗 [{}]({})", reason.source, link_target(&reason.url)));
            }
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "🕐 {}",
        esc(alert.timestamp.format("%Y-%m-%d %H:%M UTC").to_string())
    ));

    lines.join("\n")
}

fn render_failure(ticker: &str, error: &str) -> String {
    format!(
        "⚠️ *Scan failure: {}*\n{}",
        esc(ticker),
        esc(truncate(error, 300))
    )
}

fn render_summary(date: &str, rows: &[SummaryRow]) -> String {
    let mut lines = vec![format!("📋 *Sentinel daily summary {}*", esc(date)), RULE.to_string()];

    if rows.is_empty() {
        lines.push(esc("No tickers scanned."));
    }
    for row in rows {
        let line = match (&row.error, row.tier, row.composite) {
            (Some(err), _, _) => format!("⚠️ {} failed: {}", esc(&row.ticker), esc(truncate(err, 80))),
            (None, Some(tier), Some(psi)) => {
                let mut line = format!(
                    "{} {} {} {}",
                    tier.marker(),
                    esc(&row.ticker),
                    esc(format!("{:.1}", psi)),
                    tier.as_str()
                );
                if let Some(class) = row.classification {
                    line.push_str(&format!(" · {}", class.as_str()));
                }
                line
            }
            _ => format!("⚪ {} no data", esc(&row.ticker)),
        };
        lines.push(line);
    }

    lines.join("\n")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}
