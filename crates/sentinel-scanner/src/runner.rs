//! One scan cycle over the whole watchlist.
//!
//! Tickers run on a bounded worker pool. Each ticker task is its own fault
//! boundary: an error or a panic marks that ticker failed and the rest of
//! the cycle carries on. Notifications go out afterwards in watchlist order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use futures_util::FutureExt;
use notification_service::{Notification, NotificationService, SummaryRow};
use psi_engine::Evaluation;
use sentinel_core::{SignalCategory, Tier, WatchItem};
use sentinel_storage::SqliteStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::pipeline::TickerPipeline;

#[derive(Debug, Clone)]
pub enum TickerStatus {
    Evaluated(Box<Evaluation>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TickerReport {
    pub ticker: String,
    pub status: TickerStatus,
}

impl TickerReport {
    fn failed(ticker: &str, error: impl Into<String>) -> Self {
        Self {
            ticker: ticker.to_string(),
            status: TickerStatus::Failed(error.into()),
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match &self.status {
            TickerStatus::Evaluated(eval) => Some(eval),
            TickerStatus::Failed(_) => None,
        }
    }
}

/// Outcome of one cycle, in watchlist order
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub tickers: Vec<TickerReport>,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub notifications_failed: usize,
    pub failure_notices_sent: usize,
}

impl CycleReport {
    pub fn scored(&self) -> usize {
        self.tickers
            .iter()
            .filter(|t| t.evaluation().is_some_and(|e| e.result.is_some()))
            .count()
    }

    /// Evaluated but every category was absent
    pub fn skipped(&self) -> usize {
        self.tickers
            .iter()
            .filter(|t| t.evaluation().is_some_and(|e| e.result.is_none()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.tickers
            .iter()
            .filter(|t| matches!(t.status, TickerStatus::Failed(_)))
            .count()
    }

    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        self.tickers
            .iter()
            .map(|t| match &t.status {
                TickerStatus::Evaluated(eval) => SummaryRow {
                    ticker: t.ticker.clone(),
                    composite: eval.result.as_ref().map(|r| r.composite),
                    tier: eval.tier(),
                    classification: eval.report.as_ref().map(|r| r.classification.class),
                    error: None,
                },
                TickerStatus::Failed(err) => SummaryRow {
                    ticker: t.ticker.clone(),
                    composite: None,
                    tier: None,
                    classification: None,
                    error: Some(err.clone()),
                },
            })
            .collect()
    }

    /// Fixed-width per-ticker table for the cycle log
    pub fn render_table(&self) -> String {
        let mut lines = vec![format!(
            "   {:<6} {:>5}  {:<8} {:>7} {:>9} {:>10}  {}",
            "TICKER", "PSI", "TIER", "OPTIONS", "ATTENTION", "DISCLOSURE", "GATE"
        )];

        for t in &self.tickers {
            let line = match &t.status {
                TickerStatus::Failed(err) => format!("❌ {:<6} FAILED: {}", t.ticker, err),
                TickerStatus::Evaluated(eval) => match &eval.result {
                    None => format!("⚪ {:<6} {:>5}  {:<8}", t.ticker, "-", "no data"),
                    Some(result) => {
                        let cat = |c: SignalCategory| {
                            result
                                .category(c)
                                .and_then(|s| s.score)
                                .map(|s| format!("{:.1}", s))
                                .unwrap_or_else(|| "-".to_string())
                        };
                        format!(
                            "{} {:<6} {:>5.1}  {:<8} {:>7} {:>9} {:>10}  {}",
                            result.tier.marker(),
                            t.ticker,
                            result.composite,
                            result.tier.as_str(),
                            cat(SignalCategory::Options),
                            cat(SignalCategory::Attention),
                            cat(SignalCategory::Disclosure),
                            eval.gate.as_ref().map(|g| g.reason.as_str()).unwrap_or("-")
                        )
                    }
                },
            };
            lines.push(line);
        }

        lines.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct ScannerOptions {
    pub concurrency: usize,
    pub notify_failures: bool,
    pub daily_summary_hour_utc: u32,
}

pub struct Scanner {
    pipeline: Arc<TickerPipeline>,
    notifier: Arc<NotificationService>,
    store: Arc<SqliteStore>,
    watchlist: Vec<WatchItem>,
    options: ScannerOptions,
}

impl Scanner {
    pub fn new(
        pipeline: Arc<TickerPipeline>,
        notifier: Arc<NotificationService>,
        store: Arc<SqliteStore>,
        watchlist: Vec<WatchItem>,
        options: ScannerOptions,
    ) -> Self {
        Self {
            pipeline,
            notifier,
            store,
            watchlist,
            options,
        }
    }

    pub fn watchlist(&self) -> &[WatchItem] {
        &self.watchlist
    }

    /// Scores every ticker, then dispatches notifications in watchlist order.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        tracing::info!(tickers = self.watchlist.len(), "Starting scan cycle");

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, item) in self.watchlist.iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let item = item.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, TickerReport::failed(&item.ticker, "worker pool closed"));
                };

                let outcome = AssertUnwindSafe(pipeline.process(&item, now)).catch_unwind().await;
                let report = match outcome {
                    Ok(Ok(eval)) => TickerReport {
                        ticker: item.ticker.clone(),
                        status: TickerStatus::Evaluated(Box::new(eval)),
                    },
                    Ok(Err(e)) => {
                        tracing::error!(ticker = %item.ticker, "Ticker failed: {}", e);
                        TickerReport::failed(&item.ticker, e.to_string())
                    }
                    Err(panic) => {
                        let msg = panic_message(panic.as_ref());
                        tracing::error!(ticker = %item.ticker, "Ticker panicked: {}", msg);
                        TickerReport::failed(&item.ticker, format!("panic: {}", msg))
                    }
                };
                (index, report)
            });
        }

        let mut slots: Vec<Option<TickerReport>> = vec![None; self.watchlist.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => tracing::error!("Ticker task error: {}", e),
            }
        }

        let tickers: Vec<TickerReport> = slots
            .into_iter()
            .zip(&self.watchlist)
            .map(|(slot, item)| slot.unwrap_or_else(|| TickerReport::failed(&item.ticker, "task aborted")))
            .collect();

        let mut report = CycleReport {
            started_at: now,
            tickers,
            alerts_sent: 0,
            alerts_suppressed: 0,
            notifications_failed: 0,
            failure_notices_sent: 0,
        };

        self.dispatch(&mut report).await;

        tracing::info!(
            scored = report.scored(),
            skipped = report.skipped(),
            failed = report.failed(),
            alerts_sent = report.alerts_sent,
            alerts_suppressed = report.alerts_suppressed,
            "Scan cycle complete\n{}",
            report.render_table()
        );

        report
    }

    async fn dispatch(&self, report: &mut CycleReport) {
        for ticker in &report.tickers {
            match &ticker.status {
                TickerStatus::Evaluated(eval) => {
                    if let Some(alert) = &eval.alert {
                        let outcome = self.notifier.send(&Notification::PreSignal(alert.clone())).await;
                        if outcome.is_delivered() || !self.notifier.is_enabled() {
                            report.alerts_sent += 1;
                        } else {
                            report.notifications_failed += 1;
                        }
                    } else if eval.tier().is_some_and(|t| t >= Tier::Watch) {
                        report.alerts_suppressed += 1;
                    }
                }
                TickerStatus::Failed(error) if self.options.notify_failures => {
                    let outcome = self
                        .notifier
                        .send(&Notification::ScanFailure {
                            ticker: ticker.ticker.clone(),
                            error: error.clone(),
                        })
                        .await;
                    if outcome.is_delivered() {
                        report.failure_notices_sent += 1;
                    } else if outcome.failed > 0 {
                        report.notifications_failed += 1;
                    }
                }
                TickerStatus::Failed(_) => {}
            }
        }
    }

    /// Sends the daily summary once per UTC day at or after the configured
    /// hour. Returns whether it was sent.
    pub async fn maybe_send_daily_summary(&self, report: &CycleReport, now: DateTime<Utc>) -> Result<bool> {
        if now.hour() < self.options.daily_summary_hour_utc {
            return Ok(false);
        }

        let today = now.format("%Y-%m-%d").to_string();
        if self.store.load_last_summary_date().await?.as_deref() == Some(today.as_str()) {
            return Ok(false);
        }

        tracing::info!("Sending daily summary for {}", today);
        let outcome = self
            .notifier
            .send(&Notification::DailySummary {
                date: today.clone(),
                rows: report.summary_rows(),
            })
            .await;
        if outcome.failed > 0 && !outcome.is_delivered() {
            tracing::warn!("Daily summary was not delivered; will not retry today");
        }

        self.store.save_last_summary_date(&today).await?;
        Ok(true)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
