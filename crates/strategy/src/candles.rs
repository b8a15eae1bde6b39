use chrono::{DateTime, Utc};
use tracing::debug;

use common::Candle;

/// Fixed-capacity, minute-bucketed OHLC series built from price ticks.
///
/// Timestamps are strictly increasing and minute-aligned; once the capacity
/// is exceeded the oldest candles are dropped.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    candles: Vec<Candle>,
    capacity: usize,
}

impl CandleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            candles: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Replace the series with `history`, e.g. fetched at startup.
    ///
    /// Candles with non-finite prices and candles that would break the
    /// strictly increasing order are skipped.
    pub fn seed(&mut self, history: impl IntoIterator<Item = Candle>) {
        self.candles.clear();
        for mut candle in history {
            if ![candle.open, candle.high, candle.low, candle.close]
                .iter()
                .all(|v| v.is_finite() && *v > 0.0)
            {
                continue;
            }
            candle.timestamp = minute_floor(candle.timestamp);
            if self.candles.last().is_some_and(|last| candle.timestamp <= last.timestamp) {
                continue;
            }
            candle.high = candle.high.max(candle.open).max(candle.close);
            candle.low = candle.low.min(candle.open).min(candle.close);
            self.candles.push(candle);
        }
        self.truncate();
        debug!(candles = self.candles.len(), "Candle buffer seeded");
    }

    /// Fold one tick into the series and return it.
    ///
    /// `None`, non-finite and non-positive prices are ignored, as are ticks
    /// older than the last stored minute.
    pub fn ingest(&mut self, price: Option<f64>, at: DateTime<Utc>) -> &[Candle] {
        let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
            return &self.candles;
        };
        let minute = minute_floor(at);

        match self.candles.last_mut() {
            Some(last) if last.timestamp == minute => {
                last.high = last.high.max(price);
                last.low = last.low.min(price);
                last.close = price;
                return &self.candles;
            }
            Some(last) if minute < last.timestamp => {
                debug!(tick = %at, last = %last.timestamp, "Out-of-order tick ignored");
                return &self.candles;
            }
            _ => {}
        }

        // Open continues from the previous close so the series has no gaps.
        let open = self.candles.last().map(|c| c.close).unwrap_or(price);
        self.candles.push(Candle {
            timestamp: minute,
            open,
            high: open.max(price),
            low: open.min(price),
            close: price,
            volume: 0.0,
        });
        self.truncate();
        &self.candles
    }

    pub fn series(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn truncate(&mut self) {
        if self.candles.len() > self.capacity {
            let excess = self.candles.len() - self.capacity;
            self.candles.drain(..excess);
        }
    }
}

fn minute_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(60), 0).unwrap_or(at)
}
