//! Stock Sentinel scanner: watchlist loading, per-ticker pipeline and the
//! cycle runner that ties collectors, the PSI engine and notifications
//! together.

pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod watchlist;

pub use config::ScannerConfig;
pub use metrics::ScanMetrics;
pub use pipeline::{Collectors, PipelineError, TickerPipeline};
pub use runner::{CycleReport, Scanner, ScannerOptions, TickerReport, TickerStatus};
pub use watchlist::{load_watchlist, select, validate_watchlist, WatchlistError};
