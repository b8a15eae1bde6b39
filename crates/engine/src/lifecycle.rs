use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use common::shutdown::stop_flag;
use common::{
    AdvisorEvent, AdvisorSnapshot, EngineCommand, EngineState, MarketData, NewsFeed,
    OptimizationResult, ParamStore, PortfolioState, SentimentEstimator, SentimentUpdate,
    TechnicalUpdate, WorkerEvent,
};
use optimizer::{OptimizeRequest, OptimizerWorker, ParameterOptimizer};
use risk::DecisionArbiter;
use sentiment::{Cadence, RelevanceFilter, SentimentFusion, SentimentWorker};
use strategy::MarketWorker;

/// How long shutdown waits for an in-flight optimization to notice the
/// cancel flag.
const OPTIMIZER_GRACE: Duration = Duration::from_secs(5);

/// Cloneable handle passed to other crates (Telegram, API).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    snapshot: Arc<RwLock<AdvisorSnapshot>>,
    events_tx: broadcast::Sender<AdvisorEvent>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!("Engine command channel closed — command dropped");
        }
    }

    pub async fn state(&self) -> EngineState {
        self.snapshot.read().await.state
    }

    /// Copy of the latest state of every path.
    pub async fn snapshot(&self) -> AdvisorSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Subscribe to the advisor event broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<AdvisorEvent> {
        self.events_tx.subscribe()
    }
}

/// Everything the coordinator needs to (re)build its workers.
pub struct EngineParts {
    /// Live price source; its history seeds the candle buffer.
    pub market: Arc<dyn MarketData>,
    /// Coarser history source for the optimizer.
    pub history: Arc<dyn MarketData>,
    pub candle_capacity: usize,
    pub tick_interval: Duration,
    pub feeds: Vec<Arc<dyn NewsFeed>>,
    pub estimators: Vec<Arc<dyn SentimentEstimator>>,
    pub relevance: Option<RelevanceFilter>,
    pub call_timeout: Duration,
    pub cadence: Cadence,
    pub optimizer: ParameterOptimizer,
    pub arbiter: DecisionArbiter,
}

/// Running scheduled workers and the flag that stops them.
struct RunningWorkers {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// The coordinator: owns the latest technical reading, fused sentiment and
/// portfolio, recomputes advice on every update and applies optimizer
/// results to the live parameter store.
pub struct Engine {
    market: Arc<dyn MarketData>,
    candle_capacity: usize,
    tick_interval: Duration,
    feeds: Vec<Arc<dyn NewsFeed>>,
    estimators: Vec<Arc<dyn SentimentEstimator>>,
    relevance: Option<RelevanceFilter>,
    call_timeout: Duration,
    cadence: Cadence,
    arbiter: DecisionArbiter,
    params: ParamStore,

    snapshot: Arc<RwLock<AdvisorSnapshot>>,
    events_tx: broadcast::Sender<AdvisorEvent>,
    command_rx: mpsc::Receiver<EngineCommand>,
    worker_tx: mpsc::Sender<WorkerEvent>,
    worker_rx: mpsc::Receiver<WorkerEvent>,
    price_tx: watch::Sender<Option<f64>>,

    optimize_tx: Option<mpsc::Sender<OptimizeRequest>>,
    optimizer_cancel: Arc<AtomicBool>,
    optimizer_task: Option<JoinHandle<()>>,
    optimizer_worker: Option<OptimizerWorker>,
    optimize_rx: Option<mpsc::Receiver<OptimizeRequest>>,

    running: Option<RunningWorkers>,
}

impl Engine {
    pub fn new(
        parts: EngineParts,
        params: ParamStore,
        portfolio: PortfolioState,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (worker_tx, worker_rx) = mpsc::channel(64);
        let (events_tx, _) = broadcast::channel(256);
        let (price_tx, _) = watch::channel(None);
        let (optimize_tx, optimize_rx) = mpsc::channel(8);

        let snapshot = Arc::new(RwLock::new(AdvisorSnapshot {
            portfolio,
            params: (*params.snapshot()).clone(),
            ..Default::default()
        }));

        let optimizer_worker = OptimizerWorker::new(
            parts.optimizer,
            parts.history,
            params.clone(),
            worker_tx.clone(),
        );

        let handle = EngineHandle {
            command_tx,
            snapshot: snapshot.clone(),
            events_tx: events_tx.clone(),
        };

        let engine = Engine {
            market: parts.market,
            candle_capacity: parts.candle_capacity,
            tick_interval: parts.tick_interval,
            feeds: parts.feeds,
            estimators: parts.estimators,
            relevance: parts.relevance,
            call_timeout: parts.call_timeout,
            cadence: parts.cadence,
            arbiter: parts.arbiter,
            params,
            snapshot,
            events_tx,
            command_rx,
            worker_tx,
            worker_rx,
            price_tx,
            optimize_tx: Some(optimize_tx),
            optimizer_cancel: Arc::new(AtomicBool::new(false)),
            optimizer_task: None,
            optimizer_worker: Some(optimizer_worker),
            optimize_rx: Some(optimize_rx),
            running: None,
        };

        (engine, handle)
    }

    /// Run the coordinator until `Shutdown` or until every handle is dropped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Engine initialized in Stopped state. Waiting for Start command.");

        if let (Some(worker), Some(rx)) = (self.optimizer_worker.take(), self.optimize_rx.take()) {
            let cancel = self.optimizer_cancel.clone();
            self.optimizer_task = Some(tokio::spawn(worker.run(rx, cancel)));
        }

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(EngineCommand::Start) => self.start().await,
                    Some(EngineCommand::Stop) => self.stop().await,
                    Some(EngineCommand::Optimize) => self.request_optimization(),
                    Some(EngineCommand::SetPortfolio(portfolio)) => self.set_portfolio(portfolio).await,
                    Some(EngineCommand::Shutdown) => {
                        info!("Shutdown requested");
                        break;
                    }
                    None => {
                        warn!("Engine command channel closed — shutting down");
                        break;
                    }
                },
                Some(event) = self.worker_rx.recv() => self.handle_worker_event(event).await,
            }
        }

        self.shutdown().await;
    }

    // ─── Commands ─────────────────────────────────────────────────────────────

    async fn start(&mut self) {
        if self.running.is_some() {
            info!("Engine already running");
            return;
        }

        let (stop_tx, stop_rx) = stop_flag();

        let market_worker = MarketWorker::new(
            self.market.clone(),
            self.candle_capacity,
            self.params.clone(),
            self.tick_interval,
            self.worker_tx.clone(),
        );
        let fusion = SentimentFusion::new(
            self.estimators.clone(),
            self.relevance.clone(),
            self.call_timeout,
        );
        let sentiment_worker = SentimentWorker::new(
            self.feeds.clone(),
            fusion,
            self.cadence.clone(),
            self.price_tx.subscribe(),
            self.worker_tx.clone(),
        );

        let tasks = vec![
            tokio::spawn(market_worker.run(stop_rx.clone())),
            tokio::spawn(sentiment_worker.run(stop_rx)),
        ];
        self.running = Some(RunningWorkers { stop_tx, tasks });

        info!(
            feeds = self.feeds.len(),
            estimators = self.estimators.len(),
            "Workers started"
        );
        self.set_state(EngineState::Running).await;
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            info!("Engine already stopped");
            return;
        };

        info!("Engine stopping — signalling workers");
        let _ = running.stop_tx.send(true);
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        self.set_state(EngineState::Stopped).await;
    }

    fn request_optimization(&self) {
        let Some(tx) = &self.optimize_tx else {
            warn!("Optimizer queue closed — request dropped");
            return;
        };
        let request = OptimizeRequest::new();
        let run_id = request.run_id.clone();
        match tx.try_send(request) {
            Ok(()) => info!(run_id = %run_id, "Optimization queued"),
            Err(e) => warn!(error = %e, "Optimization request rejected"),
        }
    }

    async fn set_portfolio(&mut self, portfolio: PortfolioState) {
        let clean = |v: f64| if v.is_finite() && v >= 0.0 { v } else { 0.0 };
        let portfolio = PortfolioState {
            holdings: clean(portfolio.holdings),
            cash: clean(portfolio.cash),
        };
        info!(holdings = portfolio.holdings, cash = portfolio.cash, "Portfolio updated");
        self.snapshot.write().await.portfolio = portfolio;
        self.readvise().await;
    }

    async fn shutdown(&mut self) {
        if self.running.is_some() {
            self.stop().await;
        }

        self.optimizer_cancel.store(true, Ordering::Relaxed);
        self.optimize_tx = None;
        if let Some(task) = self.optimizer_task.take() {
            if tokio::time::timeout(OPTIMIZER_GRACE, task).await.is_err() {
                warn!("Optimizer did not stop in time — abandoning run");
            }
        }
        info!("Engine shut down");
    }

    // ─── Worker events ────────────────────────────────────────────────────────

    async fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Technical(update) => self.on_technical(update).await,
            WorkerEvent::Sentiment(update) => self.on_sentiment(update).await,
            WorkerEvent::OptimizationFinished(result) => self.on_optimization(result).await,
            WorkerEvent::OptimizationFailed { run_id, reason } => {
                self.publish(AdvisorEvent::OptimizationFailed { run_id, reason });
            }
        }
    }

    async fn on_technical(&mut self, update: TechnicalUpdate) {
        self.price_tx.send_replace(Some(update.price));
        {
            let mut snap = self.snapshot.write().await;
            snap.price = Some(update.price);
            snap.technical = Some(update.reading.clone());
            snap.updated_at = Some(update.timestamp);
        }
        self.publish(AdvisorEvent::Technical(update));
        self.readvise().await;
    }

    async fn on_sentiment(&mut self, update: SentimentUpdate) {
        {
            let mut snap = self.snapshot.write().await;
            snap.sentiment = Some(update.fused.clone());
            snap.news = update.news.clone();
            snap.updated_at = Some(update.timestamp);
        }
        self.publish(AdvisorEvent::Sentiment(update));
        self.readvise().await;
    }

    async fn on_optimization(&mut self, result: OptimizationResult) {
        self.snapshot.write().await.last_optimization = Some(result.clone());

        if !result.applicable {
            info!(run_id = %result.run_id, verdict = %result.verdict, "Optimization not applied");
            self.publish(AdvisorEvent::OptimizationRejected { result });
            return;
        }

        match self.params.update_params(&result.best) {
            Ok(params) => {
                let params = (*params).clone();
                self.snapshot.write().await.params = params.clone();
                info!(run_id = %result.run_id, patch = ?result.best, "Optimized parameters applied");
                self.publish(AdvisorEvent::ParamsUpdated { params, result });
            }
            Err(e) => {
                warn!(run_id = %result.run_id, error = %e, "Optimized parameters rejected");
                self.publish(AdvisorEvent::OptimizationFailed {
                    run_id: result.run_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    // ─── Advice ───────────────────────────────────────────────────────────────

    /// Recompute advice from the latest inputs. Publishes only on change.
    async fn readvise(&mut self) {
        let mut snap = self.snapshot.write().await;
        let Some(reading) = snap.technical.as_ref() else {
            return;
        };
        let sentiment = snap.sentiment.as_ref().and_then(|s| s.available_score());
        let advice = self
            .arbiter
            .advise(snap.portfolio, reading.signal, sentiment, snap.price);

        if snap.advice.as_ref() == Some(&advice) {
            return;
        }
        snap.advice = Some(advice.clone());
        snap.updated_at = Some(Utc::now());
        drop(snap);

        info!(action = %advice.action, amount = advice.amount, reason = %advice.reason, "Advice updated");
        self.publish(AdvisorEvent::Advice(advice));
    }

    async fn set_state(&mut self, state: EngineState) {
        self.snapshot.write().await.state = state;
        info!(%state, "Engine state changed");
        self.publish(AdvisorEvent::EngineStateChanged { state });
    }

    fn publish(&self, event: AdvisorEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }
}
