/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// The first value appears at index `period`, i.e. after `period + 1` closes.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period }
    }

    /// RSI at every bar of `closes` (oldest first).
    pub fn series(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let mut out = vec![None; closes.len()];
        if closes.len() < self.period + 1 {
            return out;
        }

        let n = self.period as f64;
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / n;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / n;
        out[self.period] = Some(rsi_value(avg_gain, avg_loss));

        // change i moves close i -> close i+1
        for (i, &change) in changes.iter().enumerate().skip(self.period) {
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            avg_gain = (avg_gain * (n - 1.0) + gain) / n;
            avg_loss = (avg_loss * (n - 1.0) + loss) / n;
            out[i + 1] = Some(rsi_value(avg_gain, avg_loss));
        }
        out
    }

    /// RSI of the latest bar, `None` with fewer than `period + 1` values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        self.series(closes).last().copied().flatten()
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // A flat window has no direction at all.
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_returns_none_when_insufficient_data() {
        let rsi = RsiIndicator::new(14);
        // Need at least period+1 = 15 values
        let prices = vec![100.0; 14];
        assert!(rsi.compute(&prices).is_none());
    }

    #[test]
    fn rsi_first_value_at_index_period() {
        let rsi = RsiIndicator::new(14);
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let series = rsi.series(&prices);
        assert!(series[13].is_none());
        assert!(series[14].is_some());
        assert!(series[19].is_some());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 0.0).abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_flat_series_is_midpoint() {
        let rsi = RsiIndicator::new(5);
        assert_eq!(rsi.compute(&[50.0; 12]), Some(50.0));
    }

    #[test]
    fn rsi_known_value() {
        // StockCharts reference closes; first 14-period RSI ≈ 70.46
        let rsi = RsiIndicator::new(14);
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28,
        ];
        let v = rsi.compute(&prices).unwrap();
        assert!((v - 70.46).abs() < 0.05, "RSI was {v}");
    }
}
