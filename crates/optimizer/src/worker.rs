use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use common::{MarketData, ParamStore, WorkerEvent};

use crate::search::ParameterOptimizer;

/// One queued optimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeRequest {
    pub run_id: String,
}

impl OptimizeRequest {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for OptimizeRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs queued optimizations one at a time off the async runtime.
///
/// The worker only reports results. Applying them to the live parameter
/// store is the coordinator's job.
pub struct OptimizerWorker {
    optimizer: Arc<ParameterOptimizer>,
    history: Arc<dyn MarketData>,
    params: ParamStore,
    event_tx: mpsc::Sender<WorkerEvent>,
}

impl OptimizerWorker {
    pub fn new(
        optimizer: ParameterOptimizer,
        history: Arc<dyn MarketData>,
        params: ParamStore,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            optimizer: Arc::new(optimizer),
            history,
            params,
            event_tx,
        }
    }

    /// Serve requests until the queue closes or `cancel` is raised.
    pub async fn run(self, mut requests: mpsc::Receiver<OptimizeRequest>, cancel: Arc<AtomicBool>) {
        info!(
            bars = self.optimizer.config().history_bars,
            "Optimizer worker running"
        );
        while let Some(request) = requests.recv().await {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let event = self.run_once(request, cancel.clone()).await;
            if self.event_tx.send(event).await.is_err() {
                warn!("Worker event channel closed — stopping optimizer worker");
                return;
            }
        }
        info!("Optimizer worker stopped");
    }

    /// Fetch history and run one search. Always yields exactly one event.
    pub async fn run_once(&self, request: OptimizeRequest, cancel: Arc<AtomicBool>) -> WorkerEvent {
        let run_id = request.run_id;
        let failed = |reason: String| {
            warn!(run_id = %run_id, %reason, "Optimization failed");
            WorkerEvent::OptimizationFailed {
                run_id: run_id.clone(),
                reason,
            }
        };

        let history = match self.history.history(self.optimizer.config().history_bars).await {
            Ok(h) => h,
            Err(e) => return failed(format!("history fetch failed: {e}")),
        };
        info!(run_id = %run_id, bars = history.len(), "History fetched for optimization");

        let optimizer = self.optimizer.clone();
        let base = self.params.snapshot();
        let id = run_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            optimizer.optimize(&id, &history, &base, &cancel)
        })
        .await;

        match outcome {
            Ok(Ok(result)) => WorkerEvent::OptimizationFinished(result),
            Ok(Err(e)) => failed(e.to_string()),
            Err(e) => failed(format!("optimizer task aborted: {e}")),
        }
    }
}
