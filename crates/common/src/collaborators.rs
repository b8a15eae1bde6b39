use async_trait::async_trait;

use crate::{Candle, NewsItem, Result};

/// Source of live prices and historical candles.
///
/// Absence is reported as `Ok(None)` / an empty series. Implementations must
/// not hand back a cached value as if it were fresh.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest traded price, or `None` when the market gave no answer.
    async fn latest_price(&self) -> Result<Option<f64>>;

    /// The most recent `window` candles, oldest first.
    async fn history(&self, window: usize) -> Result<Vec<Candle>>;
}

/// One headline source. Each feed fails independently.
#[async_trait]
pub trait NewsFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Current headlines in feed order.
    async fn poll(&self) -> Result<Vec<NewsItem>>;
}

/// A remote model that turns a prompt into free text ending in `score: N`.
///
/// Fusion iterates over a list of these and never branches on the concrete
/// provider.
#[async_trait]
pub trait SentimentEstimator: Send + Sync {
    fn name(&self) -> &str;

    /// Relative weight of this estimator in the fused score.
    fn weight(&self) -> f64;

    async fn score(&self, prompt: &str) -> Result<String>;
}
