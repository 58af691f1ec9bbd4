//! Error types for the rebalancer.

use std::path::PathBuf;

use crate::market::Market;

/// All errors that can occur during a rebalance run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    ConfigParseJson(#[from] serde_json::Error),

    /// An allocation for this market is already present in the balance.
    #[error("allocation for {0} already exists")]
    AlreadyExists(Market),

    /// A portfolio-model invariant was violated by the caller.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// Fewer historical market-cap records than the configured minimum.
    /// The target calculator returns this instead of a partial ranking.
    #[error("insufficient market-cap history: need {required} daily records, best asset has {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Bad exchange credentials. Short-circuits the run immediately.
    #[error("exchange authentication failed: {0}")]
    Authentication(String),

    /// Any other non-success exchange response.
    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("market-cap repository error: {0}")]
    Repository(String),
}

impl From<crate::exchange::ExchangeError> for Error {
    fn from(e: crate::exchange::ExchangeError) -> Self {
        match e {
            crate::exchange::ExchangeError::Authentication(msg) => Error::Authentication(msg),
            other => Error::Exchange(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
