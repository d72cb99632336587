use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sentinel_core::{DisclosureItem, DisclosureSource, SentinelError, WatchItem};
use serde::Deserialize;

use crate::fetcher::HttpFetcher;

const SEARCH_URL: &str = "https://efts.sec.gov/LATEST/search-index";
const FORMS: &str = "8-K,8-K/A,6-K,10-Q,10-K,4,SC 13D,SC 13G";
const MAX_HITS: usize = 10;

/// SEC EDGAR full-text search.
///
/// EDGAR rejects requests without a descriptive User-Agent, so the fetcher
/// passed in should carry one with a contact address.
#[derive(Clone)]
pub struct EdgarClient {
    fetcher: HttpFetcher,
}

impl EdgarClient {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl DisclosureSource for EdgarClient {
    async fn disclosures(
        &self,
        item: &WatchItem,
        since: DateTime<Utc>,
    ) -> Result<Vec<DisclosureItem>, SentinelError> {
        let response: Option<SearchResponse> = self
            .fetcher
            .get_json(
                SEARCH_URL,
                &[
                    ("q", format!("\"{}\"", item.ticker)),
                    ("dateRange", "custom".to_string()),
                    ("startdt", since.format("%Y-%m-%d").to_string()),
                    ("enddt", Utc::now().format("%Y-%m-%d").to_string()),
                    ("forms", FORMS.to_string()),
                ],
            )
            .await?;

        let hits = response.map(|r| r.hits.hits).unwrap_or_default();
        let filings = convert_hits(&item.ticker, hits);
        tracing::debug!(ticker = %item.ticker, count = filings.len(), "EDGAR filings fetched");
        Ok(filings)
    }
}

fn convert_hits(ticker: &str, hits: Vec<SearchHit>) -> Vec<DisclosureItem> {
    hits.into_iter()
        .take(MAX_HITS)
        .filter_map(|hit| {
            let source = hit.source;
            let filing_type = source.form.or(source.root_form)?;
            // EDGAR only reports the filing date; treat it as midnight UTC
            let filed_at = NaiveDate::parse_from_str(source.file_date.as_deref()?, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)?
                .and_utc();
            let url = filing_url(ticker, source.adsh.as_deref(), source.ciks.first().map(String::as_str));
            Some(DisclosureItem {
                filing_type,
                filed_at,
                url,
                title: source.display_names.into_iter().next(),
            })
        })
        .collect()
}

/// Filing index page when the accession number is known, otherwise the
/// company browse page.
fn filing_url(ticker: &str, adsh: Option<&str>, cik: Option<&str>) -> String {
    match (adsh, cik) {
        (Some(adsh), Some(cik)) if !adsh.is_empty() => {
            let cik = cik.trim_start_matches('0');
            format!(
                "https://www.sec.gov/Archives/edgar/data/{}/{}/{}-index.htm",
                cik,
                adsh.replace('-', ""),
                adsh
            )
        }
        _ => format!(
            "https://www.sec.gov/cgi-bin/browse-edgar?action=getcompany&CIK={}&type=&dateb=&owner=include&count=10",
            ticker
        ),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: FilingSource,
}

#[derive(Debug, Deserialize)]
struct FilingSource {
    file_date: Option<String>,
    form: Option<String>,
    root_form: Option<String>,
    #[serde(default)]
    display_names: Vec<String>,
    adsh: Option<String>,
    #[serde(default)]
    ciks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_hits() {
        let json = r#"{
            "hits": {
                "total": {"value": 2},
                "hits": [
                    {"_source": {
                        "file_date": "2026-02-12",
                        "form": "8-K",
                        "display_names": ["APPLIED MATERIALS INC /DE  (AMAT)  (CIK 0000006951)"],
                        "adsh": "0000006951-26-000012",
                        "ciks": ["0000006951"]
                    }},
                    {"_source": {"file_date": "2026-02-11", "root_form": "4"}},
                    {"_source": {"file_date": "2026-02-11"}}
                ]
            }
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let items = convert_hits("AMAT", response.hits.hits);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].filing_type, "8-K");
        assert_eq!(
            items[0].url,
            "https://www.sec.gov/Archives/edgar/data/6951/000000695126000012/0000006951-26-000012-index.htm"
        );
        assert!(items[0].title.as_deref().unwrap().contains("APPLIED MATERIALS"));
        assert_eq!(items[1].filing_type, "4");
        assert!(items[1].url.contains("browse-edgar"));
        assert_eq!(items[1].filed_at.to_rfc3339(), "2026-02-11T00:00:00+00:00");
    }
}
