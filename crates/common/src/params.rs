use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::{Error, Result};

/// Complete tunable parameter set read by the indicator engine, the signal
/// classifier and the replay backtester.
///
/// Missing fields in a persisted record fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    // Indicator windows and thresholds
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub bb_period: usize,
    pub bb_std: f64,
    pub atr_period: usize,
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub vol_period: usize,
    pub vol_ma_period: usize,
    /// Volatility must exceed `vol_filter_ratio * volatility_ma` for a
    /// directional signal. 0 disables the gate.
    pub vol_filter_ratio: f64,

    // Risk / exit parameters used by the backtester
    pub risk_pct: f64,
    pub sl_atr_mult: f64,
    pub tp_atr_mult: f64,
    pub max_trades_per_day: usize,
    pub commission: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            bb_period: 20,
            bb_std: 2.0,
            atr_period: 14,
            sma_fast: 10,
            sma_slow: 30,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            vol_period: 20,
            vol_ma_period: 50,
            vol_filter_ratio: 0.5,
            risk_pct: 0.02,
            sl_atr_mult: 1.8,
            tp_atr_mult: 4.5,
            max_trades_per_day: 15,
            commission: 0.00002,
        }
    }
}

impl StrategyParams {
    /// Number of bars needed before every indicator is defined.
    pub fn warmup_len(&self) -> usize {
        [
            self.rsi_period + 1,
            self.bb_period,
            self.atr_period + 1,
            self.sma_fast,
            self.sma_slow,
            self.macd_slow + self.macd_signal - 1,
            self.vol_period + self.vol_ma_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Reject parameter sets the indicators cannot be computed with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::Config(format!("invalid strategy params: {msg}")));

        if self.rsi_period < 2 {
            return fail("rsi_period must be >= 2");
        }
        if [
            self.bb_period,
            self.atr_period,
            self.sma_fast,
            self.macd_fast,
            self.macd_signal,
            self.vol_period,
            self.vol_ma_period,
        ]
        .contains(&0)
        {
            return fail("indicator windows must be positive");
        }
        if self.sma_fast >= self.sma_slow {
            return fail("sma_fast must be less than sma_slow");
        }
        if self.macd_fast >= self.macd_slow {
            return fail("macd_fast must be less than macd_slow");
        }
        if !(0.0 < self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought < 100.0)
        {
            return fail("expected 0 < rsi_oversold < rsi_overbought < 100");
        }
        if !(self.bb_std > 0.0) || !(self.vol_filter_ratio >= 0.0) {
            return fail("bb_std must be positive and vol_filter_ratio non-negative");
        }
        if !(self.risk_pct > 0.0 && self.risk_pct <= 1.0) {
            return fail("risk_pct must be in (0, 1]");
        }
        if !(self.sl_atr_mult > 0.0 && self.tp_atr_mult > 0.0) {
            return fail("ATR multipliers must be positive");
        }
        if self.max_trades_per_day == 0 || !(self.commission >= 0.0) {
            return fail("max_trades_per_day must be positive and commission non-negative");
        }
        Ok(())
    }

    /// Copy of `self` with every field present in `patch` overwritten.
    pub fn merged(&self, patch: &ParamsPatch) -> Self {
        let mut next = self.clone();
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = patch.$field { next.$field = v; })*
            };
        }
        apply!(
            rsi_period,
            rsi_overbought,
            rsi_oversold,
            bb_period,
            bb_std,
            atr_period,
            sma_fast,
            sma_slow,
            macd_fast,
            macd_slow,
            macd_signal,
            vol_period,
            vol_ma_period,
            vol_filter_ratio,
            risk_pct,
            sl_atr_mult,
            tp_atr_mult,
            max_trades_per_day,
            commission,
        );
        next
    }
}

/// A partial parameter set. Absent fields leave the live value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_overbought: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_oversold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_fast: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_slow: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_fast: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_slow: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_signal: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vol_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vol_ma_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vol_filter_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_atr_mult: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_atr_mult: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_trades_per_day: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<f64>,
}

impl ParamsPatch {
    pub fn is_empty(&self) -> bool {
        *self == ParamsPatch::default()
    }
}

/// Shared handle to the live `StrategyParams`.
///
/// Readers take one `Arc` snapshot per unit of work. Writers swap in a whole
/// new snapshot, so a reader sees either the old set or the new one.
#[derive(Clone)]
pub struct ParamStore {
    tx: Arc<watch::Sender<Arc<StrategyParams>>>,
}

impl ParamStore {
    pub fn new(params: StrategyParams) -> Self {
        let (tx, _) = watch::channel(Arc::new(params));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Arc<StrategyParams> {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every successful update.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StrategyParams>> {
        self.tx.subscribe()
    }

    /// Merge `patch` into the current set and publish the result.
    /// An invalid merge leaves the live set untouched.
    pub fn update_params(&self, patch: &ParamsPatch) -> Result<Arc<StrategyParams>> {
        let mut outcome = Err(Error::Config("parameter update not applied".into()));
        self.tx.send_if_modified(|current| {
            let next = current.merged(patch);
            match next.validate() {
                Ok(()) => {
                    let next = Arc::new(next);
                    *current = next.clone();
                    outcome = Ok(next);
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        if outcome.is_ok() {
            info!(?patch, "Strategy parameters updated");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(StrategyParams::default().validate().is_ok());
    }

    #[test]
    fn warmup_covers_volatility_average() {
        let p = StrategyParams::default();
        // vol_period + vol_ma_period dominates with the defaults
        assert_eq!(p.warmup_len(), 70);
    }

    #[test]
    fn merge_only_touches_patched_fields() {
        let base = StrategyParams::default();
        let patch = ParamsPatch {
            rsi_period: Some(18),
            sma_slow: Some(45),
            ..Default::default()
        };
        let merged = base.merged(&patch);
        assert_eq!(merged.rsi_period, 18);
        assert_eq!(merged.sma_slow, 45);
        assert_eq!(merged.bb_period, base.bb_period);
        assert_eq!(merged.tp_atr_mult, base.tp_atr_mult);
    }

    #[test]
    fn store_rejects_invalid_patch_and_keeps_old_snapshot() {
        let store = ParamStore::new(StrategyParams::default());
        let before = store.snapshot();
        let bad = ParamsPatch {
            sma_fast: Some(50),
            ..Default::default()
        };
        assert!(store.update_params(&bad).is_err());
        assert_eq!(*store.snapshot(), *before);
    }

    #[test]
    fn store_update_replaces_snapshot_and_notifies() {
        let store = ParamStore::new(StrategyParams::default());
        let mut rx = store.subscribe();
        let old = store.snapshot();
        let patch = ParamsPatch {
            bb_period: Some(24),
            ..Default::default()
        };
        let new = store.update_params(&patch).unwrap();
        assert_eq!(new.bb_period, 24);
        assert_eq!(old.bb_period, 20, "old snapshot must stay intact");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().bb_period, 24);
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = ParamsPatch {
            rsi_period: Some(12),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "rsi_period": 12 }));
    }
}
