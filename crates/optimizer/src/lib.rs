//! Walk-forward parameter search over a replay backtester.

pub mod backtest;
pub mod metrics;
pub mod search;
pub mod space;
pub mod worker;

pub use backtest::{BacktestReport, Backtester, ReplayBacktester};
pub use search::{OptimizeError, OptimizerConfig, ParameterOptimizer, TrialScore};
pub use space::{Dimension, Knob, ParameterSpace};
pub use worker::{OptimizeRequest, OptimizerWorker};
