use common::Candle;

use super::atr::true_range;
use super::moving::{over_defined, sma_series};

/// Rolling volatility measured as the mean true range relative to the
/// previous close, plus a moving average of that measure.
#[derive(Debug, Clone)]
pub struct VolatilityIndicator {
    pub period: usize,
    pub ma_period: usize,
}

impl VolatilityIndicator {
    pub fn new(period: usize, ma_period: usize) -> Self {
        assert!(period > 0 && ma_period > 0, "volatility windows must be positive");
        Self { period, ma_period }
    }

    /// Returns `(volatility, volatility_ma)`, both aligned with `candles`.
    /// Volatility is defined from index `period`, the average from
    /// `period + ma_period - 1`.
    pub fn series(&self, candles: &[Candle]) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
        let relative: Vec<Option<f64>> = true_range(candles)
            .into_iter()
            .enumerate()
            .map(|(i, tr)| {
                let prev_close = candles[i.checked_sub(1)?].close;
                (prev_close > 0.0).then(|| tr.map(|tr| tr / prev_close)).flatten()
            })
            .collect();
        let vol = over_defined(&relative, |r| sma_series(r, self.period));
        let vol_ma = over_defined(&vol, |v| sma_series(v, self.ma_period));
        (vol, vol_ma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: Utc.timestamp_opt(0, 0).unwrap() + Duration::minutes(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn volatility_is_relative_true_range() {
        let (vol, _) = VolatilityIndicator::new(3, 2).series(&candles(6));
        assert!(vol[2].is_none());
        assert!((vol[3].unwrap() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn average_needs_period_plus_ma_period_bars() {
        let (_, ma) = VolatilityIndicator::new(3, 2).series(&candles(6));
        assert!(ma[3].is_none());
        assert!(ma[4].is_some());
    }
}
