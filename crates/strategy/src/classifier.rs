use common::{Candle, IndicatorFrame, Signal, SignalReading, StrategyParams};

use crate::frame::IndicatorEngine;

/// Separator between the rationale phrases of one reading.
pub const RATIONALE_SEPARATOR: &str = " + ";

/// Output of one evaluation: the reading plus the annotated series.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub reading: SignalReading,
    /// One frame per candle; `None` while the series is warming up.
    pub frames: Option<Vec<IndicatorFrame>>,
}

/// Stateless rule evaluator over the latest indicator frame.
pub struct SignalClassifier;

impl SignalClassifier {
    /// Evaluate the last bar of `series`.
    ///
    /// A series shorter than the warm-up horizon yields NEUTRAL with an
    /// "insufficient data" rationale and no frames.
    pub fn evaluate(series: &[Candle], params: &StrategyParams) -> Evaluation {
        let warmup = params.warmup_len();
        if series.len() < warmup {
            return Evaluation {
                reading: SignalReading {
                    signal: Signal::Neutral,
                    rationale: format!(
                        "insufficient data: warming up ({}/{warmup} bars)",
                        series.len()
                    ),
                    warming_up: true,
                },
                frames: None,
            };
        }

        let frames = IndicatorEngine::compute(series, params);
        let reading = match (series.last(), frames.last()) {
            (Some(candle), Some(frame)) => Self::classify(candle.close, frame, params),
            _ => SignalReading {
                signal: Signal::Neutral,
                rationale: "insufficient data: empty series".into(),
                warming_up: true,
            },
        };
        Evaluation {
            reading,
            frames: Some(frames),
        }
    }

    /// Classify one bar from its close and indicator frame.
    /// Undefined indicators never trigger a condition.
    pub fn classify(close: f64, frame: &IndicatorFrame, params: &StrategyParams) -> SignalReading {
        let neutral = |rationale: String| SignalReading {
            signal: Signal::Neutral,
            rationale,
            warming_up: false,
        };

        if let (Some(vol), Some(vol_ma)) = (frame.volatility, frame.volatility_ma) {
            let floor = params.vol_filter_ratio * vol_ma;
            if params.vol_filter_ratio > 0.0 && vol <= floor {
                return neutral(format!(
                    "volatility too low ({vol:.5} <= {:.2} x avg {vol_ma:.5})",
                    params.vol_filter_ratio
                ));
            }
        }

        let buy = side_conditions(Side::Buy, close, frame, params);
        let sell = side_conditions(Side::Sell, close, frame, params);

        match (buy, sell) {
            (Some(phrases), None) => SignalReading {
                signal: Signal::Buy,
                rationale: phrases.join(RATIONALE_SEPARATOR),
                warming_up: false,
            },
            (None, Some(phrases)) => SignalReading {
                signal: Signal::Sell,
                rationale: phrases.join(RATIONALE_SEPARATOR),
                warming_up: false,
            },
            (Some(_), Some(_)) => neutral("conflicting buy and sell conditions".into()),
            (None, None) => neutral(describe_idle(frame)),
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Buy,
    Sell,
}

/// Phrases for one side in the fixed order trend, RSI, band, MACD.
/// `None` unless the trend gate and at least one reversion gate fired.
fn side_conditions(
    side: Side,
    close: f64,
    frame: &IndicatorFrame,
    params: &StrategyParams,
) -> Option<Vec<String>> {
    let (fast, slow) = (frame.sma_fast?, frame.sma_slow?);
    let trend = match side {
        Side::Buy => fast > slow,
        Side::Sell => fast < slow,
    };
    if !trend {
        return None;
    }

    let (f, s) = (params.sma_fast, params.sma_slow);
    let mut phrases = vec![match side {
        Side::Buy => format!("uptrend (SMA{f} {fast:.2} > SMA{s} {slow:.2})"),
        Side::Sell => format!("downtrend (SMA{f} {fast:.2} < SMA{s} {slow:.2})"),
    }];
    let mut reversion = false;

    match (side, frame.rsi) {
        (Side::Buy, Some(rsi)) if rsi < params.rsi_oversold => {
            phrases.push(format!("RSI oversold ({rsi:.1} < {})", params.rsi_oversold));
            reversion = true;
        }
        (Side::Sell, Some(rsi)) if rsi > params.rsi_overbought => {
            phrases.push(format!("RSI overbought ({rsi:.1} > {})", params.rsi_overbought));
            reversion = true;
        }
        _ => {}
    }

    match (side, frame.bb_lower, frame.bb_upper) {
        (Side::Buy, Some(lower), _) if close <= lower => {
            phrases.push(format!("price at lower Bollinger band ({close:.2} <= {lower:.2})"));
            reversion = true;
        }
        (Side::Sell, _, Some(upper)) if close >= upper => {
            phrases.push(format!("price at upper Bollinger band ({close:.2} >= {upper:.2})"));
            reversion = true;
        }
        _ => {}
    }

    if !reversion {
        return None;
    }

    if let (Some(macd), Some(signal)) = (frame.macd, frame.macd_signal) {
        match side {
            Side::Buy if macd > signal => phrases.push("MACD above signal".into()),
            Side::Sell if macd < signal => phrases.push("MACD below signal".into()),
            _ => {}
        }
    }

    Some(phrases)
}

fn describe_idle(frame: &IndicatorFrame) -> String {
    match (frame.sma_fast, frame.sma_slow) {
        (Some(fast), Some(slow)) if fast > slow => "hold: uptrend without a pullback".into(),
        (Some(fast), Some(slow)) if fast < slow => "hold: downtrend without a rally".into(),
        (Some(_), Some(_)) => "hold: no trend".into(),
        _ => "hold: trend undefined".into(),
    }
}
