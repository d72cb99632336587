use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sentinel_core::{
    AttentionItem, AttentionSource, ContractType, OptionsContract, OptionsSnapshot, OptionsSource,
    PriceSnapshot, PriceSource, SentinelError, WatchItem,
};
use serde::Deserialize;

use crate::fetcher::HttpFetcher;

const BASE_URL: &str = "https://api.polygon.io";
const OPTIONS_PAGE_LIMIT: &str = "250";
const NEWS_LIMIT: &str = "50";

/// Polygon.io options chain, stock snapshot and ticker news
#[derive(Clone)]
pub struct PolygonClient {
    fetcher: HttpFetcher,
    api_key: String,
}

impl PolygonClient {
    pub fn new(fetcher: HttpFetcher, api_key: String) -> Self {
        Self { fetcher, api_key }
    }
}

#[async_trait]
impl OptionsSource for PolygonClient {
    async fn options_snapshot(&self, item: &WatchItem) -> Result<Option<OptionsSnapshot>, SentinelError> {
        let url = format!("{}/v3/snapshot/options/{}", BASE_URL, item.ticker);
        let response: Option<OptionsSnapshotResponse> = self
            .fetcher
            .get_json(
                &url,
                &[
                    ("limit", OPTIONS_PAGE_LIMIT.to_string()),
                    ("apiKey", self.api_key.clone()),
                ],
            )
            .await?;

        Ok(response.and_then(|r| convert_options(&item.ticker, r, Utc::now())))
    }
}

#[async_trait]
impl PriceSource for PolygonClient {
    async fn price_snapshot(&self, item: &WatchItem) -> Result<Option<PriceSnapshot>, SentinelError> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            BASE_URL, item.ticker
        );
        let response: Option<SnapshotResponse> = self
            .fetcher
            .get_json(&url, &[("apiKey", self.api_key.clone())])
            .await?;

        Ok(response.and_then(|r| convert_price(&item.ticker, r.ticker, Utc::now())))
    }
}

#[async_trait]
impl AttentionSource for PolygonClient {
    async fn attention_items(
        &self,
        item: &WatchItem,
        since: DateTime<Utc>,
    ) -> Result<Vec<AttentionItem>, SentinelError> {
        let url = format!("{}/v2/reference/news", BASE_URL);
        let response: Option<NewsResponse> = self
            .fetcher
            .get_json(
                &url,
                &[
                    ("ticker", item.ticker.clone()),
                    ("published_utc.gte", since.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                    ("order", "desc".to_string()),
                    ("limit", NEWS_LIMIT.to_string()),
                    ("apiKey", self.api_key.clone()),
                ],
            )
            .await?;

        Ok(response
            .map(|r| convert_news(item, r.results))
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "polygon"
    }
}

fn convert_options(ticker: &str, response: OptionsSnapshotResponse, now: DateTime<Utc>) -> Option<OptionsSnapshot> {
    let results = response.results.unwrap_or_default();
    if results.is_empty() {
        return None;
    }

    let underlying_price = results
        .iter()
        .find_map(|r| r.underlying_asset.as_ref().and_then(|u| u.price));

    let contracts: Vec<OptionsContract> = results
        .into_iter()
        .filter_map(|r| {
            let details = r.details?;
            let contract_type = match details.contract_type?.to_ascii_lowercase().as_str() {
                "call" => ContractType::Call,
                "put" => ContractType::Put,
                _ => return None,
            };
            let expiry = NaiveDate::parse_from_str(details.expiration_date.as_deref()?, "%Y-%m-%d").ok()?;
            Some(OptionsContract {
                contract_type,
                strike: details.strike_price?,
                expiry,
                volume: r.day.and_then(|d| d.volume).unwrap_or(0.0).max(0.0) as u64,
                open_interest: r.open_interest.unwrap_or(0).max(0) as u64,
                implied_vol: r.implied_volatility,
            })
        })
        .collect();

    Some(OptionsSnapshot {
        ticker: ticker.to_string(),
        underlying_price,
        as_of: now,
        source: "Polygon options".to_string(),
        url: Some(format!("https://polygon.io/quote/{}", ticker)),
        contracts,
    })
}

fn convert_price(ticker: &str, snap: SnapshotTicker, now: DateTime<Utc>) -> Option<PriceSnapshot> {
    let last = snap
        .last_trade
        .as_ref()
        .and_then(|t| t.p)
        .or_else(|| snap.day.as_ref().and_then(|d| d.c))
        .filter(|p| *p > 0.0)?;

    let volume_ratio = match (
        snap.day.as_ref().and_then(|d| d.v),
        snap.prev_day.as_ref().and_then(|d| d.v),
    ) {
        (Some(today), Some(prev)) if prev > 0.0 => Some(today / prev),
        _ => None,
    };

    Some(PriceSnapshot {
        ticker: ticker.to_string(),
        last,
        change_pct: snap.todays_change_perc.unwrap_or(0.0),
        volume_ratio,
        as_of: now,
    })
}

fn convert_news(item: &WatchItem, results: Vec<NewsResult>) -> Vec<AttentionItem> {
    results
        .into_iter()
        .filter_map(|r| {
            let published_at = DateTime::parse_from_rfc3339(&r.published_utc)
                .ok()?
                .with_timezone(&Utc);
            let text = format!("{} {}", r.title, r.description.as_deref().unwrap_or(""));
            Some(AttentionItem {
                matched_keywords: item.matched_terms(&text),
                title: r.title,
                source: r
                    .publisher
                    .and_then(|p| p.name)
                    .unwrap_or_else(|| "Polygon".to_string()),
                url: r.article_url,
                published_at,
            })
        })
        .collect()
}

// Options types
#[derive(Debug, Deserialize)]
struct OptionsSnapshotResponse {
    results: Option<Vec<OptionsContractSnapshot>>,
}

#[derive(Debug, Deserialize)]
struct OptionsContractSnapshot {
    #[serde(default)]
    details: Option<OptionsDetails>,
    implied_volatility: Option<f64>,
    open_interest: Option<i64>,
    #[serde(default)]
    day: Option<OptionsDay>,
    #[serde(default)]
    underlying_asset: Option<UnderlyingAsset>,
}

#[derive(Debug, Deserialize)]
struct OptionsDetails {
    contract_type: Option<String>,
    strike_price: Option<f64>,
    expiration_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OptionsDay {
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UnderlyingAsset {
    price: Option<f64>,
}

// Snapshot types
#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: SnapshotTicker,
}

#[derive(Debug, Deserialize)]
struct SnapshotTicker {
    day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    prev_day: Option<SnapshotDay>,
    #[serde(rename = "todaysChangePerc")]
    todays_change_perc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDay {
    c: Option<f64>,
    v: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotLastTrade {
    p: Option<f64>,
}

// News types
#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    title: String,
    published_utc: String,
    article_url: String,
    description: Option<String>,
    publisher: Option<Publisher>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    name: Option<String>,
}
