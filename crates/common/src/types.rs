use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::{ParamsPatch, StrategyParams};

/// One OHLCV bar, keyed by the minute it opened in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A flat candle where every price field equals `price`.
    pub fn flat(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }
}

/// Derived indicator values for a single bar.
///
/// Every field is `None` until its trailing window is full. `None` means
/// "insufficient data" and must never be read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFrame {
    pub rsi: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr: Option<f64>,
    pub sma_fast: Option<f64>,
    pub sma_slow: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub volatility: Option<f64>,
    pub volatility_ma: Option<f64>,
}

/// Discrete output of the signal classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    #[default]
    Neutral,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Result of one technical evaluation: the signal and the text explaining it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    pub signal: Signal,
    pub rationale: String,
    /// True when the series was shorter than the warm-up horizon.
    pub warming_up: bool,
}

/// Emitted by the market worker after every processed tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalUpdate {
    pub price: f64,
    pub reading: SignalReading,
    pub candles: Vec<Candle>,
    /// Per-candle indicator values, aligned with `candles`.
    /// `None` while the series is still warming up.
    pub frames: Option<Vec<IndicatorFrame>>,
    pub timestamp: DateTime<Utc>,
}

/// A headline produced by a news feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub language: String,
    /// Name of the feed the item came from.
    pub source: String,
    /// Local relevance score in 0..=10. `None` means the item was never
    /// scored, which is distinct from a score of zero.
    pub relevance: Option<u8>,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        language: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            language: language.into(),
            source: source.into(),
            relevance: None,
        }
    }
}

/// One estimator's answer for one fusion cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub estimator: String,
    /// Always within [-10, 10].
    pub score: i32,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentStatus {
    Available,
    Unavailable,
}

/// Weighted combination of every estimator that answered in a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSentiment {
    /// Always within [-10, 10]; 0 when `status` is `Unavailable`.
    pub score: i32,
    pub rationale: String,
    pub contributors: usize,
    pub status: SentimentStatus,
}

impl FusedSentiment {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            score: 0,
            rationale: format!("sentiment unavailable: {}", reason.into()),
            contributors: 0,
            status: SentimentStatus::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == SentimentStatus::Available
    }

    /// The score, or `None` when no estimator contributed.
    pub fn available_score(&self) -> Option<i32> {
        self.is_available().then_some(self.score)
    }
}

/// Emitted by the sentiment worker once per fusion cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentUpdate {
    pub fused: FusedSentiment,
    pub news: Vec<NewsItem>,
    /// True when the news fingerprint was unchanged and no estimator ran.
    pub reused: bool,
    pub timestamp: DateTime<Utc>,
}

/// Caller-owned account state. The arbiter only reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioState {
    pub holdings: f64,
    pub cash: f64,
}

/// Recommended direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
            Action::Hold => write!(f, "hold"),
        }
    }
}

/// Final recommendation produced by the decision arbiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub action: Action,
    /// Currency amount, rounded to 2 decimals.
    pub amount: f64,
    pub reason: String,
}

impl Advice {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            amount: 0.0,
            reason: reason.into(),
        }
    }
}

/// How far the test-segment Sharpe fell behind the training Sharpe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverfitVerdict {
    Low,
    Moderate,
    High,
    Inconclusive,
}

impl std::fmt::Display for OverfitVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverfitVerdict::Low => write!(f, "low"),
            OverfitVerdict::Moderate => write!(f, "moderate"),
            OverfitVerdict::High => write!(f, "high"),
            OverfitVerdict::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Outcome of one optimizer run. Consumed once by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub run_id: String,
    /// Only the searched parameters; everything else keeps its live value.
    pub best: ParamsPatch,
    /// Objective achieved on the training segment.
    pub train_score: f64,
    /// Objective of the same parameters on the held-out segment.
    pub test_score: Option<f64>,
    /// Sharpe degradation in percent, when both scores exist.
    pub degradation_pct: Option<f64>,
    pub verdict: OverfitVerdict,
    pub trials: usize,
    /// False when the verdict blocked the write-back.
    pub applicable: bool,
}

/// Events sent from a worker to the coordinator.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Technical(TechnicalUpdate),
    Sentiment(SentimentUpdate),
    OptimizationFinished(OptimizationResult),
    OptimizationFailed { run_id: String, reason: String },
}

/// Events pushed from the coordinator to consumers (Telegram, dashboard).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdvisorEvent {
    Technical(TechnicalUpdate),
    Sentiment(SentimentUpdate),
    Advice(Advice),
    ParamsUpdated {
        params: StrategyParams,
        result: OptimizationResult,
    },
    OptimizationRejected { result: OptimizationResult },
    OptimizationFailed { run_id: String, reason: String },
    EngineStateChanged { state: EngineState },
}

/// Whether the scheduled workers are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Commands sent to the coordinator via the command channel.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
    Optimize,
    SetPortfolio(PortfolioState),
    Shutdown,
}

/// Latest state of every path, kept by the coordinator for polled reads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdvisorSnapshot {
    pub state: EngineState,
    pub price: Option<f64>,
    pub technical: Option<SignalReading>,
    pub sentiment: Option<FusedSentiment>,
    pub news: Vec<NewsItem>,
    pub portfolio: PortfolioState,
    pub advice: Option<Advice>,
    pub params: StrategyParams,
    pub last_optimization: Option<OptimizationResult>,
    pub updated_at: Option<DateTime<Utc>>,
}
