//! Price path: candle aggregation, indicators and the rule-based classifier.

pub mod candles;
pub mod classifier;
pub mod frame;
pub mod indicators;
pub mod worker;

pub use candles::CandleBuffer;
pub use classifier::{Evaluation, SignalClassifier, RATIONALE_SEPARATOR};
pub use frame::IndicatorEngine;
pub use worker::MarketWorker;
