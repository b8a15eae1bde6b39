use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use common::shutdown::sleep_or_stop;
use common::{MarketData, ParamStore, TechnicalUpdate, WorkerEvent};

use crate::candles::CandleBuffer;
use crate::classifier::SignalClassifier;

/// Periodic market-tick worker: fetch price, fold into the candle buffer,
/// classify, emit a `TechnicalUpdate`.
pub struct MarketWorker {
    market: Arc<dyn MarketData>,
    buffer: CandleBuffer,
    params: ParamStore,
    interval: Duration,
    event_tx: mpsc::Sender<WorkerEvent>,
}

impl MarketWorker {
    pub fn new(
        market: Arc<dyn MarketData>,
        capacity: usize,
        params: ParamStore,
        interval: Duration,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            market,
            buffer: CandleBuffer::new(capacity),
            params,
            interval,
            event_tx,
        }
    }

    /// Run until `stop` flips or the coordinator goes away.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs_f64(), "Market worker running");
        self.warm_start().await;

        loop {
            if let Some(update) = self.tick(Utc::now()).await {
                if self.event_tx.send(WorkerEvent::Technical(update)).await.is_err() {
                    warn!("Worker event channel closed — stopping market worker");
                    return;
                }
            }
            if sleep_or_stop(&mut stop, self.interval).await {
                break;
            }
        }
        info!("Market worker stopped");
    }

    async fn warm_start(&mut self) {
        match self.market.history(self.buffer.capacity()).await {
            Ok(history) if !history.is_empty() => {
                self.buffer.seed(history);
                info!(candles = self.buffer.len(), "Candle buffer warm-started");
            }
            Ok(_) => info!("No history available — cold start"),
            Err(e) => warn!(error = %e, "History fetch failed — cold start"),
        }
    }

    /// One unit of work. `None` when no price was available this cycle.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Option<TechnicalUpdate> {
        let price = match self.market.latest_price().await {
            Ok(Some(p)) => p,
            Ok(None) => {
                debug!("No price this cycle");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Price fetch failed");
                return None;
            }
        };

        // One params snapshot per unit of work.
        let params = self.params.snapshot();
        let series = self.buffer.ingest(Some(price), now);
        let eval = SignalClassifier::evaluate(series, &params);
        debug!(price, signal = %eval.reading.signal, "Technical evaluation");

        Some(TechnicalUpdate {
            price,
            reading: eval.reading,
            candles: series.to_vec(),
            frames: eval.frames,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Candle, Result, Signal, StrategyParams};
    use std::sync::Mutex;

    struct ScriptedMarket {
        prices: Mutex<Vec<Option<f64>>>,
    }

    #[async_trait]
    impl MarketData for ScriptedMarket {
        async fn latest_price(&self) -> Result<Option<f64>> {
            let mut prices = self.prices.lock().unwrap();
            Ok(if prices.is_empty() { Some(2000.0) } else { prices.remove(0) })
        }

        async fn history(&self, _window: usize) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }
    }

    fn worker(prices: Vec<Option<f64>>) -> (MarketWorker, mpsc::Receiver<WorkerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let market = Arc::new(ScriptedMarket {
            prices: Mutex::new(prices),
        });
        let w = MarketWorker::new(
            market,
            200,
            ParamStore::new(StrategyParams::default()),
            Duration::from_millis(10),
            tx,
        );
        (w, rx)
    }

    #[tokio::test]
    async fn missing_price_emits_nothing() {
        let (mut w, _rx) = worker(vec![None]);
        assert!(w.tick(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn cold_buffer_reports_warming_up() {
        let (mut w, _rx) = worker(vec![Some(1990.0)]);
        let update = w.tick(Utc::now()).await.unwrap();
        assert_eq!(update.price, 1990.0);
        assert_eq!(update.reading.signal, Signal::Neutral);
        assert!(update.reading.warming_up);
        assert_eq!(update.candles.len(), 1);
    }

    #[tokio::test]
    async fn run_emits_and_honours_stop() {
        let (w, mut rx) = worker(vec![]);
        let (stop_tx, stop_rx) = common::shutdown::stop_flag();
        let handle = tokio::spawn(w.run(stop_rx));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event")
            .unwrap();
        assert!(matches!(event, WorkerEvent::Technical(_)));

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
