use common::Candle;

use super::moving::{over_defined, sma_series};

/// True range per bar. Bar 0 has no previous close and yields `None`.
pub fn true_range(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    for (i, pair) in candles.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        out[i + 1] = Some(tr);
    }
    out
}

/// Average True Range: simple mean of the true range over `period` bars.
/// First defined at index `period`.
#[derive(Debug, Clone)]
pub struct AtrIndicator {
    pub period: usize,
}

impl AtrIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "ATR period must be positive");
        Self { period }
    }

    pub fn series(&self, candles: &[Candle]) -> Vec<Option<f64>> {
        over_defined(&true_range(candles), |tr| sma_series(tr, self.period))
    }
}
