use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use common::{Candle, Error, MarketData, Result};

const BASE_URL: &str = "https://api.binance.com";
/// Largest `limit` the klines endpoint accepts.
const KLINES_PAGE: usize = 1000;

/// Public (unsigned) Binance spot market data for one symbol.
///
/// `interval` is the kline width used by `history`, e.g. "1m" for the live
/// candle buffer or "15m" for optimizer history.
pub struct BinanceMarketData {
    pair: String,
    interval: String,
    base_url: String,
    http: Client,
}

impl BinanceMarketData {
    pub fn new(pair: impl Into<String>, interval: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            pair: pair.into(),
            interval: interval.into(),
            base_url: BASE_URL.to_string(),
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}{path_and_query}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::MarketData(format!("HTTP {status}: {body}")));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn klines_page(&self, limit: usize, end_time: Option<i64>) -> Result<Vec<Candle>> {
        let mut query = format!(
            "/api/v3/klines?symbol={}&interval={}&limit={limit}",
            self.pair, self.interval
        );
        if let Some(end) = end_time {
            query.push_str(&format!("&endTime={end}"));
        }
        let rows: Vec<Vec<Value>> = self.get(&query).await?;
        Ok(rows.iter().filter_map(|row| parse_kline(row)).collect())
    }
}

#[async_trait]
impl MarketData for BinanceMarketData {
    async fn latest_price(&self) -> Result<Option<f64>> {
        let ticker: PriceTicker = self
            .get(&format!("/api/v3/ticker/price?symbol={}", self.pair))
            .await?;
        Ok(ticker.price.parse::<f64>().ok().filter(|p| p.is_finite() && *p > 0.0))
    }

    /// Pages backwards from now until `window` candles are collected or the
    /// exchange runs out of history.
    async fn history(&self, window: usize) -> Result<Vec<Candle>> {
        let mut candles: Vec<Candle> = Vec::with_capacity(window);
        let mut end_time: Option<i64> = None;

        while candles.len() < window {
            let limit = (window - candles.len()).min(KLINES_PAGE);
            let page = self.klines_page(limit, end_time).await?;
            let Some(first) = page.first() else { break };
            end_time = Some(first.timestamp.timestamp_millis() - 1);
            let short = page.len() < limit;
            candles = page.into_iter().chain(candles).collect();
            if short {
                break;
            }
        }

        debug!(pair = %self.pair, interval = %self.interval, candles = candles.len(), "History fetched");
        Ok(candles)
    }
}

/// Parse one kline row: `[open_time_ms, "open", "high", "low", "close", "volume", ...]`.
pub fn parse_kline(row: &[Value]) -> Option<Candle> {
    let number = |i: usize| -> Option<f64> {
        match row.get(i)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };
    Some(Candle {
        timestamp: DateTime::from_timestamp_millis(row.first()?.as_i64()?)?,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5)?,
    })
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}
