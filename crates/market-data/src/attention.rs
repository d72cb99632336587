use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use sentinel_core::{AttentionItem, AttentionSource, SentinelError, WatchItem};

const TITLE_PREFIX_CHARS: usize = 30;

/// Fans out to several news sources and merges their articles.
///
/// A failing source is logged and skipped; the merge only fails when every
/// source failed.
pub struct MergedAttention {
    sources: Vec<Arc<dyn AttentionSource>>,
}

impl MergedAttention {
    pub fn new(sources: Vec<Arc<dyn AttentionSource>>) -> Self {
        Self { sources }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl AttentionSource for MergedAttention {
    async fn attention_items(
        &self,
        item: &WatchItem,
        since: DateTime<Utc>,
    ) -> Result<Vec<AttentionItem>, SentinelError> {
        let results = join_all(self.sources.iter().map(|s| s.attention_items(item, since))).await;

        // (source index, article)
        let mut merged: Vec<(usize, AttentionItem)> = Vec::new();
        let mut errors = Vec::new();

        for (index, (source, result)) in self.sources.iter().zip(results).enumerate() {
            match result {
                Ok(items) => {
                    for incoming in items {
                        let seen = merged
                            .iter()
                            .any(|(from, a)| *from != index && is_same_story(a, &incoming));
                        if !seen {
                            merged.push((index, incoming));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(ticker = %item.ticker, source = source.name(), "News source failed: {}", e);
                    errors.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        if !self.sources.is_empty() && errors.len() == self.sources.len() {
            return Err(SentinelError::Collector(errors.join("; ")));
        }

        let mut merged: Vec<AttentionItem> = merged.into_iter().map(|(_, a)| a).collect();
        merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(merged)
    }

    fn name(&self) -> &str {
        "merged"
    }
}

/// Same URL, or one title contains the other's 30-char prefix. Titles
/// shorter than the prefix never match on text.
fn is_same_story(a: &AttentionItem, b: &AttentionItem) -> bool {
    if !a.url.is_empty() && a.url == b.url {
        return true;
    }

    let a_lower = a.title.trim().to_lowercase();
    let b_lower = b.title.trim().to_lowercase();
    if a_lower.chars().count() < TITLE_PREFIX_CHARS || b_lower.chars().count() < TITLE_PREFIX_CHARS {
        return false;
    }

    let a_prefix: String = a_lower.chars().take(TITLE_PREFIX_CHARS).collect();
    let b_prefix: String = b_lower.chars().take(TITLE_PREFIX_CHARS).collect();
    a_lower.contains(&b_prefix) || b_lower.contains(&a_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct FakeSource {
        name: &'static str,
        items: Vec<AttentionItem>,
        fail: bool,
    }

    #[async_trait]
    impl AttentionSource for FakeSource {
        async fn attention_items(
            &self,
            _item: &WatchItem,
            _since: DateTime<Utc>,
        ) -> Result<Vec<AttentionItem>, SentinelError> {
            if self.fail {
                return Err(SentinelError::Collector("boom".to_string()));
            }
            Ok(self.items.clone())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn article(title: &str, url: &str, hours_ago: i64) -> AttentionItem {
        AttentionItem {
            title: title.to_string(),
            source: "Reuters".to_string(),
            url: url.to_string(),
            published_at: Utc::now() - Duration::hours(hours_ago),
            matched_keywords: vec![],
        }
    }

    fn watch() -> WatchItem {
        WatchItem {
            ticker: "AMAT".to_string(),
            name: "Applied Materials".to_string(),
            sector: String::new(),
            related: vec![],
            keywords: vec![],
        }
    }

    #[tokio::test]
    async fn test_merge_dedupes_and_sorts_newest_first() {
        let a = FakeSource {
            name: "a",
            items: vec![
                article("Applied Materials raises outlook on AI demand", "https://a/1", 5),
                article("Chip equipment stocks slide", "https://a/2", 1),
            ],
            fail: false,
        };
        let b = FakeSource {
            name: "b",
            items: vec![
                article("Applied Materials raises outlook on AI demand - Reuters", "https://b/1", 4),
                article("Unrelated story", "https://a/2", 3),
                article("AMAT export license update", "https://b/3", 2),
            ],
            fail: false,
        };
        let merged = MergedAttention::new(vec![Arc::new(a), Arc::new(b)]);
        let items = merged.attention_items(&watch(), Utc::now() - Duration::hours(24)).await.unwrap();

        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Chip equipment stocks slide",
                "AMAT export license update",
                "Applied Materials raises outlook on AI demand",
            ]
        );
    }

    #[tokio::test]
    async fn test_one_failing_source_is_tolerated() {
        let ok = FakeSource {
            name: "ok",
            items: vec![article("AMAT news", "https://x/1", 1)],
            fail: false,
        };
        let bad = FakeSource {
            name: "bad",
            items: vec![],
            fail: true,
        };
        let merged = MergedAttention::new(vec![Arc::new(bad), Arc::new(ok)]);
        let items = merged.attention_items(&watch(), Utc::now()).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_title_does_not_swallow_later_articles() {
        let a = FakeSource {
            name: "a",
            items: vec![article("", "https://a/0", 3)],
            fail: false,
        };
        let b = FakeSource {
            name: "b",
            items: vec![
                article("AMAT beats estimates on record WFE demand", "https://b/1", 2),
                article("Export control update hits chip tools", "https://b/2", 1),
            ],
            fail: false,
        };
        let merged = MergedAttention::new(vec![Arc::new(a), Arc::new(b)]);
        let items = merged.attention_items(&watch(), Utc::now() - Duration::hours(24)).await.unwrap();
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_short_title_is_not_a_prefix_match() {
        let a = FakeSource {
            name: "a",
            items: vec![article("AMAT", "https://a/1", 2)],
            fail: false,
        };
        let b = FakeSource {
            name: "b",
            items: vec![article("Analysts upgrade AMAT after earnings", "https://b/1", 1)],
            fail: false,
        };
        let merged = MergedAttention::new(vec![Arc::new(a), Arc::new(b)]);
        let items = merged.attention_items(&watch(), Utc::now() - Duration::hours(24)).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_single_source_articles_are_kept() {
        let a = FakeSource {
            name: "a",
            items: vec![
                article("", "https://a/1", 3),
                article("Applied Materials raises outlook on AI demand", "https://a/2", 2),
                article("Applied Materials raises outlook on AI demand again", "https://a/3", 1),
            ],
            fail: false,
        };
        let merged = MergedAttention::new(vec![Arc::new(a)]);
        let items = merged.attention_items(&watch(), Utc::now() - Duration::hours(24)).await.unwrap();
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_an_error() {
        let bad = FakeSource {
            name: "bad",
            items: vec![],
            fail: true,
        };
        let merged = MergedAttention::new(vec![Arc::new(bad)]);
        let err = merged.attention_items(&watch(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, SentinelError::Collector(_)));
    }
}
