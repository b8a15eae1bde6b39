use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("News feed error: {0}")]
    Feed(String),

    #[error("Sentiment estimator error: {0}")]
    Estimator(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Optimizer error: {0}")]
    Optimizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
