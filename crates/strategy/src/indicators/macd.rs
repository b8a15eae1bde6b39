use super::moving::{ema_series, over_defined};

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow), signal = EMA(macd_line, signal_period).
/// The line is defined from index `slow - 1`, the signal from
/// `slow + signal - 2`.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// Aligned MACD line and signal line.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be less than slow period");
        assert!(signal > 0, "MACD signal period must be positive");
        Self { fast, slow, signal }
    }

    pub fn series(&self, closes: &[f64]) -> MacdSeries {
        let fast = ema_series(closes, self.fast);
        let slow = ema_series(closes, self.slow);
        let line: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();
        let signal = over_defined(&line, |defined| ema_series(defined, self.signal));
        MacdSeries { line, signal }
    }
}
