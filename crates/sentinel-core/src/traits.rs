use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AttentionItem, DisclosureItem, OptionsSnapshot, PriceSnapshot, SentinelError, WatchItem};

/// Options chain provider
#[async_trait]
pub trait OptionsSource: Send + Sync {
    /// `Ok(None)` when no chain exists for the ticker (unavailable, not calm)
    async fn options_snapshot(&self, item: &WatchItem) -> Result<Option<OptionsSnapshot>, SentinelError>;
}

/// News / social attention provider
#[async_trait]
pub trait AttentionSource: Send + Sync {
    /// Items published at or after `since`, newest first
    async fn attention_items(
        &self,
        item: &WatchItem,
        since: DateTime<Utc>,
    ) -> Result<Vec<AttentionItem>, SentinelError>;

    fn name(&self) -> &str;
}

/// Regulatory / corporate disclosure provider
#[async_trait]
pub trait DisclosureSource: Send + Sync {
    async fn disclosures(
        &self,
        item: &WatchItem,
        since: DateTime<Utc>,
    ) -> Result<Vec<DisclosureItem>, SentinelError>;
}

/// Quote provider used for context only
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price_snapshot(&self, item: &WatchItem) -> Result<Option<PriceSnapshot>, SentinelError>;
}
