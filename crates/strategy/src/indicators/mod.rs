//! Per-bar indicator series.
//!
//! Every function returns one `Option<f64>` per input bar, aligned with the
//! input. A bar whose trailing window is not yet full yields `None`.

pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod moving;
pub mod rsi;
pub mod volatility;

pub use atr::{true_range, AtrIndicator};
pub use bollinger::{BandPoint, BollingerBands};
pub use macd::{MacdIndicator, MacdSeries};
pub use moving::{ema_series, sma_series};
pub use rsi::RsiIndicator;
pub use volatility::VolatilityIndicator;
