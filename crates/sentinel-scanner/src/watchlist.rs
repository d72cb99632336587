use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use sentinel_core::WatchItem;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WatchlistError {
    #[error("watchlist is empty")]
    Empty,
    #[error("invalid ticker {0:?}: expected upper-case letters, digits, '.' or '-'")]
    InvalidTicker(String),
    #[error("duplicate ticker {0}")]
    Duplicate(String),
    #[error("ticker {0} has an empty name")]
    MissingName(String),
    #[error("SCAN_TICKER {0} is not on the watchlist")]
    UnknownScanTicker(String),
}

/// Reads and validates a JSON array of watch items.
pub fn load_watchlist(path: impl AsRef<Path>) -> Result<Vec<WatchItem>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read watchlist {}", path.display()))?;
    let items: Vec<WatchItem> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse watchlist {}", path.display()))?;
    validate_watchlist(&items)?;
    Ok(items)
}

pub fn validate_watchlist(items: &[WatchItem]) -> Result<(), WatchlistError> {
    if items.is_empty() {
        return Err(WatchlistError::Empty);
    }

    let mut seen = HashSet::new();
    for item in items {
        let valid = !item.ticker.is_empty()
            && item
                .ticker
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-');
        if !valid {
            return Err(WatchlistError::InvalidTicker(item.ticker.clone()));
        }
        if item.name.trim().is_empty() {
            return Err(WatchlistError::MissingName(item.ticker.clone()));
        }
        if !seen.insert(item.ticker.as_str()) {
            return Err(WatchlistError::Duplicate(item.ticker.clone()));
        }
    }
    Ok(())
}

/// Restricts the watchlist to `ticker` when set.
pub fn select(items: Vec<WatchItem>, ticker: Option<&str>) -> Result<Vec<WatchItem>, WatchlistError> {
    match ticker {
        None => Ok(items),
        Some(t) => {
            let selected: Vec<WatchItem> = items.into_iter().filter(|i| i.ticker == t).collect();
            if selected.is_empty() {
                Err(WatchlistError::UnknownScanTicker(t.to_string()))
            } else {
                Ok(selected)
            }
        }
    }
}
