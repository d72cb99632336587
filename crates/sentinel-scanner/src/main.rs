use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use market_data::{
    EdgarClient, FetchConfig, FinnhubClient, HttpFetcher, MergedAttention, PolygonClient, RateLimiter,
};
use notification_service::{NotificationConfig, NotificationService};
use psi_engine::{PsiConfig, PsiEngine};
use sentinel_core::AttentionSource;
use sentinel_scanner::{
    load_watchlist, select, Collectors, ScanMetrics, Scanner, ScannerConfig, ScannerOptions,
    TickerPipeline,
};
use sentinel_storage::SqliteStore;
use tokio::signal::unix::SignalKind;
use tokio::time;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting Stock Sentinel scanner");

    // 2. Configuration; any error here stops before a ticker is touched
    let psi_config = PsiConfig::from_env().context("Invalid PSI configuration")?;
    let config = ScannerConfig::from_env()?;
    let watchlist = select(load_watchlist(&config.watchlist_path)?, config.scan_ticker.as_deref())?;

    tracing::info!("Configuration loaded and validated");
    tracing::info!(
        "  Weights: options {:.2} / attention {:.2} / disclosure {:.2}",
        psi_config.weights.options,
        psi_config.weights.attention,
        psi_config.weights.disclosure
    );
    tracing::info!(
        "  Tiers: watch {} / alert {} / critical {}",
        psi_config.tiers.watch,
        psi_config.tiers.alert,
        psi_config.tiers.critical
    );
    tracing::info!("  Watchlist: {} tickers", watchlist.len());
    tracing::info!("  Concurrency: {}", config.concurrency);

    // 3. Storage
    let store = Arc::new(
        SqliteStore::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?,
    );
    tracing::info!("Database ready ({})", config.database_url);

    // 4. Collectors, engine, notifier
    let collectors = build_collectors(&config)?;
    if collectors.configured() == 0 {
        tracing::warn!("No collectors configured; every ticker will be skipped");
    }

    let engine = Arc::new(PsiEngine::new(psi_config, store.clone(), store.clone()));
    let pipeline = Arc::new(TickerPipeline::new(collectors, engine));

    let notification_config = NotificationConfig::from_env().context("Invalid notification configuration")?;
    let notifier = Arc::new(NotificationService::new(&notification_config));
    if !notifier.is_enabled() {
        tracing::warn!("No notification channel configured; alerts will only be logged");
    }

    let scanner = Scanner::new(
        pipeline,
        notifier,
        store.clone(),
        watchlist,
        ScannerOptions {
            concurrency: config.concurrency,
            notify_failures: config.notify_failures,
            daily_summary_hour_utc: config.daily_summary_hour_utc,
        },
    );

    let mut metrics = ScanMetrics::new(config.metrics_log_interval_cycles);
    match store.load_metrics().await {
        Ok(Some(saved)) => metrics.restore_from_json(&saved),
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to load persisted metrics, starting from zero: {}", e),
    }

    if !config.is_loop_mode() {
        run_once(&scanner, &store, &mut metrics).await;
        tracing::info!("Single scan complete.");
        return Ok(());
    }

    tracing::info!(
        "Scanner is now running. Scanning every {}s. Press Ctrl+C to stop.",
        config.scan_interval_seconds
    );

    // Main loop with graceful shutdown (SIGINT + SIGTERM)
    let mut interval = time::interval(Duration::from_secs(config.scan_interval_seconds));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_once(&scanner, &store, &mut metrics).await;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                if let Err(e) = store.save_metrics(&metrics.to_json()).await {
                    tracing::warn!("Failed to persist metrics on shutdown: {}", e);
                }
                metrics.log_metrics();
                break;
            }
        }
    }

    tracing::info!("Scanner shut down.");
    Ok(())
}

/// One cycle plus its bookkeeping. Nothing here is fatal to the process.
async fn run_once(scanner: &Scanner, store: &SqliteStore, metrics: &mut ScanMetrics) {
    let cycle_start = ScanMetrics::start_timer();
    let now = chrono::Utc::now();

    let report = scanner.run_cycle(now).await;
    metrics.record_cycle(&report);

    if let Err(e) = scanner.maybe_send_daily_summary(&report, now).await {
        tracing::warn!("Failed to send daily summary: {}", e);
    }

    metrics.finish_cycle(cycle_start);
    if let Err(e) = store.save_metrics(&metrics.to_json()).await {
        tracing::warn!("Failed to persist metrics: {}", e);
    }
}

fn build_collectors(config: &ScannerConfig) -> Result<Collectors> {
    let fetch = FetchConfig {
        timeout: Duration::from_secs(config.http_timeout_seconds),
        max_retries: config.http_max_retries,
        ..FetchConfig::default()
    };

    let mut collectors = Collectors::default();
    let mut attention: Vec<Arc<dyn AttentionSource>> = Vec::new();

    match &config.polygon_api_key {
        Some(key) => {
            let fetcher = HttpFetcher::new(fetch.clone())?
                .with_rate_limiter(RateLimiter::per_minute(config.polygon_rate_limit));
            let polygon = Arc::new(PolygonClient::new(fetcher, key.clone()));
            collectors.options = Some(polygon.clone());
            collectors.price = Some(polygon.clone());
            attention.push(polygon);
            tracing::info!(
                "Polygon collector enabled ({} req/min)",
                config.polygon_rate_limit
            );
        }
        None => tracing::warn!("POLYGON_API_KEY not set; options and price data unavailable"),
    }

    if let Some(key) = &config.finnhub_api_key {
        let finnhub = FinnhubClient::new(HttpFetcher::new(fetch.clone())?, key.clone());
        attention.push(Arc::new(finnhub));
        tracing::info!("Finnhub news collector enabled");
    }

    let merged = MergedAttention::new(attention);
    if merged.is_empty() {
        tracing::warn!("No news source configured; attention data unavailable");
    } else {
        collectors.attention = Some(Arc::new(merged));
    }

    // SEC requires a descriptive User-Agent with contact details
    let edgar_fetcher = HttpFetcher::new(FetchConfig {
        user_agent: config.sec_user_agent.clone(),
        ..fetch
    })?;
    collectors.disclosure = Some(Arc::new(EdgarClient::new(edgar_fetcher)));
    tracing::info!("EDGAR filing collector enabled");

    Ok(collectors)
}
