use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use common::shutdown::sleep_or_stop;
use common::{NewsFeed, NewsItem, SentimentUpdate, WorkerEvent};

use crate::cadence::Cadence;
use crate::fusion::SentimentFusion;

/// Periodic sentiment worker: poll feeds, fuse, emit a `SentimentUpdate`.
/// The cadence mode is re-evaluated at the top of every cycle.
pub struct SentimentWorker {
    feeds: Vec<Arc<dyn NewsFeed>>,
    fusion: SentimentFusion,
    cadence: Cadence,
    price_rx: watch::Receiver<Option<f64>>,
    event_tx: mpsc::Sender<WorkerEvent>,
}

impl SentimentWorker {
    pub fn new(
        feeds: Vec<Arc<dyn NewsFeed>>,
        fusion: SentimentFusion,
        cadence: Cadence,
        price_rx: watch::Receiver<Option<f64>>,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            feeds,
            fusion,
            cadence,
            price_rx,
            event_tx,
        }
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(feeds = self.feeds.len(), "Sentiment worker running");
        loop {
            let mode = self.cadence.mode_at(Utc::now());
            let settings = self.cadence.settings(mode);

            let raw = collect_news(&self.feeds).await;
            let price = *self.price_rx.borrow();
            let cycle = self
                .fusion
                .run_cycle(raw, settings.relevance_threshold, price)
                .await;
            info!(
                mode = %mode,
                score = cycle.fused.score,
                available = cycle.fused.is_available(),
                reused = cycle.reused,
                "Sentiment cycle complete"
            );

            let update = SentimentUpdate {
                fused: cycle.fused,
                news: cycle.news,
                reused: cycle.reused,
                timestamp: Utc::now(),
            };
            if self.event_tx.send(WorkerEvent::Sentiment(update)).await.is_err() {
                warn!("Worker event channel closed — stopping sentiment worker");
                return;
            }

            if sleep_or_stop(&mut stop, settings.poll_interval).await {
                break;
            }
        }
        info!("Sentiment worker stopped");
    }
}

/// Poll every feed concurrently. A failing feed contributes nothing.
pub async fn collect_news(feeds: &[Arc<dyn NewsFeed>]) -> Vec<NewsItem> {
    let polls = feeds.iter().map(|feed| async move {
        match feed.poll().await {
            Ok(items) => items,
            Err(e) => {
                warn!(feed = %feed.name(), error = %e, "News feed failed");
                Vec::new()
            }
        }
    });
    join_all(polls).await.into_iter().flatten().collect()
}
