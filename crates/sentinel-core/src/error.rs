use thiserror::Error;

/// Failure taxonomy shared by collectors, stores and the notifier.
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Collector error: {0}")]
    Collector(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
