use chrono::NaiveDate;
use common::{Candle, Result, Signal, StrategyParams};
use strategy::frame::is_complete;
use strategy::{IndicatorEngine, SignalClassifier};
use tracing::warn;

use crate::metrics;

/// Summary of one replay over a historical series.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    /// Completed round trips, including a position closed at the end.
    pub trades: usize,
    /// Annualized Sharpe of the per-bar equity curve. NaN when undefined.
    pub sharpe: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub final_equity: f64,
}

/// Anything that can score a parameter set against a candle series.
pub trait Backtester: Send + Sync {
    fn run_backtest(&self, series: &[Candle], params: &StrategyParams) -> Result<BacktestReport>;
}

// ─── Replay backtester ────────────────────────────────────────────────────────

/// Bar-by-bar replay of the live classifier with ATR-based exits.
///
/// Entries fire on the classifier's signal at the bar close. Stops and targets
/// are checked against the close of every following bar. Each completed
/// round trip counts toward `max_trades_per_day`; the counter resets when the
/// UTC date changes.
#[derive(Debug, Clone)]
pub struct ReplayBacktester {
    pub initial_cash: f64,
    /// Bars per year of the replayed series; annualizes the per-bar Sharpe.
    pub periods_per_year: f64,
}

/// The market trades around the clock, every day of the year.
const MINUTES_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;

/// Default history interval, 15-minute bars.
const DEFAULT_PERIODS_PER_YEAR: f64 = MINUTES_PER_YEAR / 15.0;

impl Default for ReplayBacktester {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
        }
    }
}

impl ReplayBacktester {
    /// Backtester annualizing for the kline `interval` of the history it
    /// will replay, e.g. "15m" or "1h". Unknown intervals keep the default.
    pub fn for_interval(interval: &str) -> Self {
        let periods_per_year = bars_per_year(interval).unwrap_or_else(|| {
            warn!(interval, "Unrecognised history interval — assuming 15m bars");
            DEFAULT_PERIODS_PER_YEAR
        });
        Self {
            periods_per_year,
            ..Self::default()
        }
    }
}

/// Bars per year for a kline interval such as "1m", "15m", "4h", "1d", "1w".
pub fn bars_per_year(interval: &str) -> Option<f64> {
    let unit = interval.chars().last()?;
    let count: f64 = interval[..interval.len() - unit.len_utf8()]
        .parse()
        .ok()
        .filter(|n: &f64| *n > 0.0)?;
    let minutes = match unit {
        'm' => 1.0,
        'h' => 60.0,
        'd' => 24.0 * 60.0,
        'w' => 7.0 * 24.0 * 60.0,
        _ => return None,
    };
    Some(MINUTES_PER_YEAR / (count * minutes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    side: Side,
    entry: f64,
    units: f64,
    stop: f64,
    target: f64,
}

impl Position {
    fn pnl(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => (price - self.entry) * self.units,
            Side::Short => (self.entry - price) * self.units,
        }
    }

    fn exit_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop || price >= self.target,
            Side::Short => price >= self.stop || price <= self.target,
        }
    }
}

/// Fraction of equity to commit so that a stop-out loses `risk_pct` of it.
pub fn position_fraction(equity: f64, entry: f64, stop: f64, risk_pct: f64) -> f64 {
    let risk_per_unit = (entry - stop).abs();
    if risk_per_unit <= 0.0 || entry <= 0.0 || equity <= 0.0 {
        return 0.95;
    }
    let units = equity * risk_pct / risk_per_unit;
    let fraction = units / (equity / entry);
    fraction.clamp(0.1, 0.95)
}

impl Backtester for ReplayBacktester {
    fn run_backtest(&self, series: &[Candle], params: &StrategyParams) -> Result<BacktestReport> {
        params.validate()?;

        let frames = IndicatorEngine::compute(series, params);
        let warmup = params.warmup_len();

        let mut equity = self.initial_cash;
        let mut curve = Vec::with_capacity(series.len());
        let mut position: Option<Position> = None;
        let mut trades = 0usize;
        let mut day: Option<NaiveDate> = None;
        let mut trades_today = 0usize;

        for (i, (candle, frame)) in series.iter().zip(&frames).enumerate() {
            let price = candle.close;
            let today = candle.timestamp.date_naive();
            if day != Some(today) {
                day = Some(today);
                trades_today = 0;
            }

            if let Some(open) = position {
                if open.exit_hit(price) {
                    equity += open.pnl(price) - price * open.units * params.commission;
                    position = None;
                    trades += 1;
                    trades_today += 1;
                }
            } else if i + 1 >= warmup
                && trades_today < params.max_trades_per_day
                && is_complete(frame)
            {
                let reading = SignalClassifier::classify(price, frame, params);
                let side = match reading.signal {
                    Signal::Buy => Some(Side::Long),
                    Signal::Sell => Some(Side::Short),
                    Signal::Neutral => None,
                };
                if let (Some(side), Some(atr)) = (side, frame.atr) {
                    let (stop, target) = match side {
                        Side::Long => (price - params.sl_atr_mult * atr, price + params.tp_atr_mult * atr),
                        Side::Short => (price + params.sl_atr_mult * atr, price - params.tp_atr_mult * atr),
                    };
                    let fraction = position_fraction(equity, price, stop, params.risk_pct);
                    let units = equity * fraction / price;
                    equity -= price * units * params.commission;
                    position = Some(Position {
                        side,
                        entry: price,
                        units,
                        stop,
                        target,
                    });
                }
            }

            let marked = equity + position.map_or(0.0, |p| p.pnl(price));
            curve.push(marked);
        }

        if let (Some(open), Some(last)) = (position, series.last()) {
            equity += open.pnl(last.close) - last.close * open.units * params.commission;
            trades += 1;
            if let Some(end) = curve.last_mut() {
                *end = equity;
            }
        }

        Ok(BacktestReport {
            trades,
            sharpe: metrics::sharpe_ratio(&curve, self.periods_per_year),
            total_return: metrics::total_return(&curve),
            max_drawdown: metrics::max_drawdown(&curve),
            final_equity: equity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series_from(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    /// Oscillating trend: long rises interrupted by sharp dips, so the
    /// classifier sees oversold bars inside an uptrend.
    fn choppy_uptrend(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                2000.0 + t * 0.8 + 25.0 * (t / 6.0).sin()
            })
            .collect()
    }

    #[test]
    fn flat_series_makes_no_trades() {
        let series = series_from(&vec![2000.0; 300]);
        let report = ReplayBacktester::default()
            .run_backtest(&series, &StrategyParams::default())
            .unwrap();
        assert_eq!(report.trades, 0);
        assert_eq!(report.final_equity, 100_000.0);
        assert!(report.sharpe.is_nan());
    }

    #[test]
    fn short_series_stays_in_warmup() {
        let series = series_from(&choppy_uptrend(60));
        let report = ReplayBacktester::default()
            .run_backtest(&series, &StrategyParams::default())
            .unwrap();
        assert_eq!(report.trades, 0);
    }

    #[test]
    fn invalid_params_fail() {
        let series = series_from(&vec![2000.0; 100]);
        let params = StrategyParams {
            sma_fast: 40,
            sma_slow: 20,
            ..Default::default()
        };
        assert!(ReplayBacktester::default().run_backtest(&series, &params).is_err());
    }

    #[test]
    fn replay_is_deterministic() {
        let series = series_from(&choppy_uptrend(600));
        let params = StrategyParams::default();
        let bt = ReplayBacktester::default();
        let a = bt.run_backtest(&series, &params).unwrap();
        let b = bt.run_backtest(&series, &params).unwrap();
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.final_equity, b.final_equity);
    }

    /// 37 one-point rises then three 12-point drops, repeated. The second
    /// drop of each block closes under the lower band while SMA10 > SMA30.
    fn sawtooth(blocks: usize) -> Vec<f64> {
        let mut closes = Vec::with_capacity(blocks * 40);
        let mut price = 2000.0;
        for _ in 0..blocks {
            for _ in 0..37 {
                price += 1.0;
                closes.push(price);
            }
            for _ in 0..3 {
                price -= 12.0;
                closes.push(price);
            }
        }
        closes
    }

    #[test]
    fn pullbacks_in_uptrend_produce_trades() {
        let series = series_from(&sawtooth(15));
        let report = ReplayBacktester::default()
            .run_backtest(&series, &StrategyParams::default())
            .unwrap();
        assert!(report.trades > 0);
        assert!(report.sharpe.is_finite());
        assert_ne!(report.final_equity, 100_000.0);
        assert!(report.max_drawdown >= 0.0);
    }

    #[test]
    fn annualization_follows_bar_width() {
        assert_eq!(bars_per_year("15m"), Some(35_040.0));
        assert_eq!(bars_per_year("1h"), Some(8_760.0));
        assert_eq!(bars_per_year("1d"), Some(365.0));
        assert_eq!(bars_per_year("1M"), None);
        assert_eq!(bars_per_year("0m"), None);
        assert_eq!(bars_per_year(""), None);
        assert_eq!(ReplayBacktester::for_interval("4h").periods_per_year, 2_190.0);
        assert_eq!(
            ReplayBacktester::for_interval("weird").periods_per_year,
            ReplayBacktester::default().periods_per_year
        );
    }

    #[test]
    fn sizing_targets_risk_and_clamps() {
        // 2000 at risk / 10 per unit = 200 units, 4x the 50 units equity buys
        assert_eq!(position_fraction(100_000.0, 2000.0, 1990.0, 0.02), 0.95);
        // 2 units = 0.04 of equity, raised to the floor
        assert_eq!(position_fraction(100_000.0, 2000.0, 1000.0, 0.02), 0.1);
        // 20 units
        assert!((position_fraction(100_000.0, 2000.0, 1900.0, 0.02) - 0.4).abs() < 1e-12);
        assert_eq!(position_fraction(100_000.0, 2000.0, 2000.0, 0.02), 0.95);
    }

    #[test]
    fn long_position_exits_on_stop_and_target() {
        let p = Position {
            side: Side::Long,
            entry: 100.0,
            units: 1.0,
            stop: 95.0,
            target: 110.0,
        };
        assert!(p.exit_hit(95.0));
        assert!(p.exit_hit(110.0));
        assert!(!p.exit_hit(100.0));
        let s = Position { side: Side::Short, stop: 105.0, target: 90.0, ..p };
        assert!(s.exit_hit(105.0));
        assert!(s.exit_hit(90.0));
        assert_eq!(s.pnl(90.0), 10.0);
    }
}
