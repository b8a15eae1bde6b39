mod rest;

pub use rest::{parse_kline, BinanceMarketData};
