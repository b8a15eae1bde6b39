use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use common::{ParamsPatch, StrategyParams};

/// A searchable strategy parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Knob {
    RsiPeriod,
    RsiOverbought,
    RsiOversold,
    BbPeriod,
    BbStd,
    AtrPeriod,
    SmaFast,
    SmaSlow,
    MacdFast,
    MacdSlow,
    MacdSignal,
    SlAtrMult,
    TpAtrMult,
}

impl Knob {
    fn set(self, patch: &mut ParamsPatch, value: f64) {
        let int = value.round().max(0.0) as usize;
        match self {
            Knob::RsiPeriod => patch.rsi_period = Some(int),
            Knob::RsiOverbought => patch.rsi_overbought = Some(value),
            Knob::RsiOversold => patch.rsi_oversold = Some(value),
            Knob::BbPeriod => patch.bb_period = Some(int),
            Knob::BbStd => patch.bb_std = Some(value),
            Knob::AtrPeriod => patch.atr_period = Some(int),
            Knob::SmaFast => patch.sma_fast = Some(int),
            Knob::SmaSlow => patch.sma_slow = Some(int),
            Knob::MacdFast => patch.macd_fast = Some(int),
            Knob::MacdSlow => patch.macd_slow = Some(int),
            Knob::MacdSignal => patch.macd_signal = Some(int),
            Knob::SlAtrMult => patch.sl_atr_mult = Some(value),
            Knob::TpAtrMult => patch.tp_atr_mult = Some(value),
        }
    }
}

/// Candidate values for one knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub knob: Knob,
    pub values: Vec<f64>,
}

impl Dimension {
    /// `start..end` stepping by `step`, end exclusive.
    pub fn range(knob: Knob, start: f64, end: f64, step: f64) -> Self {
        let mut values = Vec::new();
        if step > 0.0 {
            let mut v = start;
            while v < end - 1e-9 {
                values.push(v);
                v += step;
            }
        }
        Self { knob, values }
    }
}

/// Cartesian product of knob dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub dimensions: Vec<Dimension>,
}

impl Default for ParameterSpace {
    /// RSI period, slow SMA and Bollinger period, the knobs the live strategy
    /// is most sensitive to.
    fn default() -> Self {
        Self {
            dimensions: vec![
                Dimension::range(Knob::RsiPeriod, 10.0, 25.0, 2.0),
                Dimension::range(Knob::SmaSlow, 20.0, 60.0, 5.0),
                Dimension::range(Knob::BbPeriod, 15.0, 30.0, 3.0),
            ],
        }
    }
}

impl ParameterSpace {
    /// Number of grid points, saturating on overflow. Zero when any
    /// dimension is empty.
    pub fn grid_size(&self) -> usize {
        if self.dimensions.is_empty() {
            return 0;
        }
        self.dimensions
            .iter()
            .fold(1usize, |acc, d| acc.saturating_mul(d.values.len()))
    }

    /// Decode a grid index (mixed radix, last dimension fastest).
    pub fn point(&self, mut index: usize) -> ParamsPatch {
        let mut patch = ParamsPatch::default();
        for dim in self.dimensions.iter().rev() {
            let n = dim.values.len();
            if n == 0 {
                continue;
            }
            dim.knob.set(&mut patch, dim.values[index % n]);
            index /= n;
        }
        patch
    }

    /// The full grid when it fits in `max_trials`, otherwise `max_trials`
    /// distinct points drawn with a seeded RNG.
    pub fn candidates(&self, max_trials: usize, seed: u64) -> Vec<ParamsPatch> {
        let size = self.grid_size();
        if size <= max_trials {
            return (0..size).map(|i| self.point(i)).collect();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picks = rand::seq::index::sample(&mut rng, size, max_trials).into_vec();
        picks.sort_unstable();
        picks.into_iter().map(|i| self.point(i)).collect()
    }
}

/// Structural constraints a candidate must meet before it is replayed.
pub fn satisfies_constraints(params: &StrategyParams) -> bool {
    params.sma_fast < params.sma_slow
        && params.macd_fast < params.macd_slow
        && params.rsi_oversold < 50.0
        && 50.0 < params.rsi_overbought
        && params.validate().is_ok()
}
