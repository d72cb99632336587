//! HTTP collectors feeding the PSI pipeline.
//!
//! Every client maps "no data for this ticker/key" to an empty result and
//! reserves errors for transport or decode failures that survived retries.

pub mod attention;
pub mod edgar;
pub mod fetcher;
pub mod finnhub;
pub mod polygon;
pub mod rate_limit;

pub use attention::MergedAttention;
pub use edgar::EdgarClient;
pub use fetcher::{backoff_delay, FetchConfig, HttpFetcher};
pub use finnhub::FinnhubClient;
pub use polygon::PolygonClient;
pub use rate_limit::RateLimiter;
