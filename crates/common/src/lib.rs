pub mod collaborators;
pub mod config;
pub mod error;
pub mod params;
pub mod settings;
pub mod shutdown;
pub mod types;

pub use collaborators::{MarketData, NewsFeed, SentimentEstimator};
pub use config::Config;
pub use error::{Error, Result};
pub use params::{ParamStore, ParamsPatch, StrategyParams};
pub use settings::Settings;
pub use types::*;

/// Round a currency amount to 2 decimal places.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
