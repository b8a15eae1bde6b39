//! Coordinator and exchange market data.

pub mod binance;
pub mod lifecycle;

pub use binance::BinanceMarketData;
pub use lifecycle::{Engine, EngineHandle, EngineParts};
