use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{AttentionItem, AttentionSource, SentinelError, WatchItem};
use serde::Deserialize;

use crate::fetcher::HttpFetcher;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const MAX_ARTICLES: usize = 30;

/// Finnhub company news (free tier)
#[derive(Clone)]
pub struct FinnhubClient {
    fetcher: HttpFetcher,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(fetcher: HttpFetcher, api_key: String) -> Self {
        Self { fetcher, api_key }
    }
}

#[async_trait]
impl AttentionSource for FinnhubClient {
    async fn attention_items(
        &self,
        item: &WatchItem,
        since: DateTime<Utc>,
    ) -> Result<Vec<AttentionItem>, SentinelError> {
        let url = format!("{}/company-news", BASE_URL);
        let articles: Option<Vec<FinnhubArticle>> = self
            .fetcher
            .get_json(
                &url,
                &[
                    ("symbol", item.ticker.clone()),
                    ("from", since.format("%Y-%m-%d").to_string()),
                    ("to", Utc::now().format("%Y-%m-%d").to_string()),
                    ("token", self.api_key.clone()),
                ],
            )
            .await?;

        Ok(convert_articles(item, articles.unwrap_or_default(), since))
    }

    fn name(&self) -> &str {
        "finnhub"
    }
}

fn convert_articles(item: &WatchItem, articles: Vec<FinnhubArticle>, since: DateTime<Utc>) -> Vec<AttentionItem> {
    articles
        .into_iter()
        .take(MAX_ARTICLES)
        .filter_map(|a| {
            let published_at = DateTime::from_timestamp(a.datetime, 0)?;
            if published_at < since || a.headline.trim().is_empty() {
                return None;
            }
            let text = format!("{} {}", a.headline, a.summary);
            Some(AttentionItem {
                matched_keywords: item.matched_terms(&text),
                title: a.headline,
                source: if a.source.is_empty() {
                    "Finnhub".to_string()
                } else {
                    a.source
                },
                url: a.url,
                published_at,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_articles_filters_window() {
        let item = WatchItem {
            ticker: "AMAT".to_string(),
            name: "Applied Materials".to_string(),
            sector: String::new(),
            related: vec!["LRCX".to_string()],
            keywords: vec![],
        };
        let json = r#"[
            {"datetime": 1771000000, "headline": "Lam Research (LRCX) and AMAT rally", "source": "Yahoo", "summary": "", "url": "https://y/1"},
            {"datetime": 1000000000, "headline": "ancient", "source": "Yahoo", "url": "https://y/2"},
            {"datetime": 1771000100, "headline": "", "url": "https://y/3"}
        ]"#;
        let articles: Vec<FinnhubArticle> = serde_json::from_str(json).unwrap();
        let since = DateTime::from_timestamp(1770900000, 0).unwrap();
        let items = convert_articles(&item, articles, since);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "Yahoo");
        assert!(items[0].matched_keywords.contains(&"AMAT".to_string()));
        assert!(items[0].matched_keywords.contains(&"LRCX".to_string()));
    }
}
