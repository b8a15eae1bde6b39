use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use common::{Candle, OptimizationResult, OverfitVerdict, ParamsPatch, StrategyParams};

use crate::backtest::{BacktestReport, Backtester};
use crate::space::{satisfies_constraints, ParameterSpace};

/// Errors that end an optimization run without a result.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("insufficient history: {bars} bars, need at least {required}")]
    InsufficientHistory { bars: usize, required: usize },

    #[error("optimization cancelled")]
    Cancelled,

    #[error("no candidate produced a usable score ({trials} trials)")]
    NoViableCandidate { trials: usize },
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Read from the `optimizer` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Candles requested from the history source per run.
    pub history_bars: usize,
    pub max_trials: usize,
    pub min_bars: usize,
    /// Share of the history used for the search; the rest is held out.
    pub train_fraction: f64,
    pub seed: u64,
    /// Skip the write-back when the verdict is `High`.
    pub reject_high_overfit: bool,
    pub space: ParameterSpace,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            // 60 days of 15-minute bars
            history_bars: 5760,
            max_trials: 200,
            min_bars: 500,
            train_fraction: 0.75,
            seed: 42,
            reject_high_overfit: true,
            space: ParameterSpace::default(),
        }
    }
}

// ─── Trial ranking ────────────────────────────────────────────────────────────

/// Outcome of one candidate on the training segment.
///
/// Ranked `NoTrades < Failed < Degenerate < Scored`, with scored trials
/// compared by Sharpe. A NaN Sharpe therefore never beats a real one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialScore {
    NoTrades,
    Failed,
    Degenerate,
    Scored(f64),
}

impl TrialScore {
    pub fn from_report(report: &BacktestReport) -> Self {
        if report.trades == 0 {
            TrialScore::NoTrades
        } else if !report.sharpe.is_finite() {
            TrialScore::Degenerate
        } else {
            TrialScore::Scored(report.sharpe)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            TrialScore::Scored(v) => Some(*v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TrialScore::NoTrades => 0,
            TrialScore::Failed => 1,
            TrialScore::Degenerate => 2,
            TrialScore::Scored(_) => 3,
        }
    }
}

impl PartialOrd for TrialScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (TrialScore::Scored(a), TrialScore::Scored(b)) => Some(a.total_cmp(b)),
            _ => Some(self.rank().cmp(&other.rank())),
        }
    }
}

/// Map a train/test pair onto an overfitting verdict.
///
/// Degradation is `(train - test) / |train| * 100`. Either side missing, or a
/// zero training score, gives `Inconclusive`.
pub fn overfit_verdict(train: Option<f64>, test: Option<f64>) -> (Option<f64>, OverfitVerdict) {
    let (Some(train), Some(test)) = (train, test) else {
        return (None, OverfitVerdict::Inconclusive);
    };
    if train == 0.0 {
        return (None, OverfitVerdict::Inconclusive);
    }
    let degradation = (train - test) / train.abs() * 100.0;
    let verdict = if degradation < 20.0 {
        OverfitVerdict::Low
    } else if degradation < 40.0 {
        OverfitVerdict::Moderate
    } else {
        OverfitVerdict::High
    };
    (Some(degradation), verdict)
}

// ─── Optimizer ────────────────────────────────────────────────────────────────

/// Searches the parameter space on a training segment and validates the
/// winner on the held-out tail.
pub struct ParameterOptimizer {
    backtester: Arc<dyn Backtester>,
    config: OptimizerConfig,
}

impl ParameterOptimizer {
    pub fn new(backtester: Arc<dyn Backtester>, config: OptimizerConfig) -> Self {
        Self { backtester, config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the search. Blocking; call from `spawn_blocking`.
    ///
    /// `cancel` is checked before every trial.
    pub fn optimize(
        &self,
        run_id: &str,
        history: &[Candle],
        base: &StrategyParams,
        cancel: &AtomicBool,
    ) -> Result<OptimizationResult, OptimizeError> {
        let cfg = &self.config;
        if history.len() < cfg.min_bars {
            return Err(OptimizeError::InsufficientHistory {
                bars: history.len(),
                required: cfg.min_bars,
            });
        }

        let split = ((history.len() as f64) * cfg.train_fraction.clamp(0.0, 1.0)) as usize;
        let (train, test) = history.split_at(split);

        let candidates = cfg.space.candidates(cfg.max_trials, cfg.seed);
        info!(
            run_id,
            candidates = candidates.len(),
            train_bars = train.len(),
            test_bars = test.len(),
            "Optimization started"
        );

        let mut best: Option<(TrialScore, ParamsPatch, StrategyParams)> = None;
        let mut trials = 0usize;

        for patch in candidates {
            if cancel.load(AtomicOrdering::Relaxed) {
                info!(run_id, trials, "Optimization cancelled");
                return Err(OptimizeError::Cancelled);
            }

            let params = base.merged(&patch);
            if !satisfies_constraints(&params) {
                debug!(?patch, "Candidate skipped by constraints");
                continue;
            }
            trials += 1;

            let score = match self.backtester.run_backtest(train, &params) {
                Ok(report) => TrialScore::from_report(&report),
                Err(e) => {
                    debug!(?patch, error = %e, "Backtest failed");
                    TrialScore::Failed
                }
            };

            let better = match &best {
                None => true,
                Some((current, _, _)) => score > *current,
            };
            if better {
                best = Some((score, patch, params));
            }
        }

        let Some((TrialScore::Scored(train_score), patch, params)) = best else {
            return Err(OptimizeError::NoViableCandidate { trials });
        };

        let test_score = self
            .backtester
            .run_backtest(test, &params)
            .ok()
            .and_then(|r| TrialScore::from_report(&r).value());
        let (degradation_pct, verdict) = overfit_verdict(Some(train_score), test_score);
        let applicable = !(cfg.reject_high_overfit && verdict == OverfitVerdict::High);

        info!(
            run_id,
            trials,
            train_score,
            ?test_score,
            %verdict,
            applicable,
            "Optimization finished"
        );

        Ok(OptimizationResult {
            run_id: run_id.to_string(),
            best: patch,
            train_score,
            test_score,
            degradation_pct,
            verdict,
            trials,
            applicable,
        })
    }
}
