use common::{Candle, IndicatorFrame, StrategyParams};

use crate::indicators::{
    sma_series, AtrIndicator, BollingerBands, MacdIndicator, RsiIndicator, VolatilityIndicator,
};

/// Computes every indicator for a candle series in one pass.
///
/// Pure: the same series and parameters always give the same frames, and a
/// frame at index `i` only depends on candles `0..=i`.
pub struct IndicatorEngine;

impl IndicatorEngine {
    /// One frame per candle, aligned with `series`.
    ///
    /// `params` must have passed [`StrategyParams::validate`].
    pub fn compute(series: &[Candle], params: &StrategyParams) -> Vec<IndicatorFrame> {
        let closes: Vec<f64> = series.iter().map(|c| c.close).collect();

        let rsi = RsiIndicator::new(params.rsi_period).series(&closes);
        let bands = BollingerBands::new(params.bb_period, params.bb_std).series(&closes);
        let atr = AtrIndicator::new(params.atr_period).series(series);
        let sma_fast = sma_series(&closes, params.sma_fast);
        let sma_slow = sma_series(&closes, params.sma_slow);
        let macd = MacdIndicator::new(params.macd_fast, params.macd_slow, params.macd_signal)
            .series(&closes);
        let (volatility, volatility_ma) =
            VolatilityIndicator::new(params.vol_period, params.vol_ma_period).series(series);

        (0..series.len())
            .map(|i| IndicatorFrame {
                rsi: rsi[i],
                bb_upper: bands[i].map(|b| b.upper),
                bb_middle: bands[i].map(|b| b.middle),
                bb_lower: bands[i].map(|b| b.lower),
                atr: atr[i],
                sma_fast: sma_fast[i],
                sma_slow: sma_slow[i],
                macd: macd.line[i],
                macd_signal: macd.signal[i],
                volatility: volatility[i],
                volatility_ma: volatility_ma[i],
            })
            .collect()
    }
}

/// True when every indicator in the frame is defined.
pub fn is_complete(frame: &IndicatorFrame) -> bool {
    [
        frame.rsi,
        frame.bb_upper,
        frame.bb_middle,
        frame.bb_lower,
        frame.atr,
        frame.sma_fast,
        frame.sma_slow,
        frame.macd,
        frame.macd_signal,
        frame.volatility,
        frame.volatility_ma,
    ]
    .iter()
    .all(Option::is_some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn wavy(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 2000.0 + (i as f64 * 0.7).sin() * 15.0 + i as f64 * 0.2;
                Candle {
                    timestamp: Utc.timestamp_opt(0, 0).unwrap() + Duration::minutes(i as i64),
                    open: close - 1.0,
                    high: close + 2.0,
                    low: close - 3.0,
                    close,
                    volume: 0.0,
                }
            })
            .collect()
    }

    #[test]
    fn frames_align_with_series() {
        let series = wavy(90);
        let frames = IndicatorEngine::compute(&series, &StrategyParams::default());
        assert_eq!(frames.len(), series.len());
    }

    #[test]
    fn last_frame_complete_exactly_at_warmup() {
        let params = StrategyParams::default();
        let warmup = params.warmup_len();

        let short = IndicatorEngine::compute(&wavy(warmup - 1), &params);
        assert!(!is_complete(short.last().unwrap()));

        let full = IndicatorEngine::compute(&wavy(warmup), &params);
        assert!(is_complete(full.last().unwrap()));
    }

    #[test]
    fn frames_are_causal() {
        let params = StrategyParams::default();
        let series = wavy(120);
        let all = IndicatorEngine::compute(&series, &params);
        let prefix = IndicatorEngine::compute(&series[..80], &params);
        assert_eq!(all[79], prefix[79]);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let params = StrategyParams::default();
        let series = wavy(100);
        assert_eq!(
            IndicatorEngine::compute(&series, &params),
            IndicatorEngine::compute(&series, &params)
        );
    }
}
