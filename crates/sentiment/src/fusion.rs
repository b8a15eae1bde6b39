use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use common::{FusedSentiment, NewsItem, SentimentEstimator, SentimentResult, SentimentStatus};

use crate::estimator::{build_prompt, parse_score, summarize, SCORE_MAX, SCORE_MIN};
use crate::news::{dedupe, fingerprint};
use crate::relevance::{relevant, RelevanceFilter};

const RATIONALE_CHARS: usize = 280;

/// Output of one fusion cycle.
#[derive(Debug, Clone)]
pub struct FusionCycle {
    pub fused: FusedSentiment,
    /// Deduplicated items, annotated with relevance when the filter is on.
    pub news: Vec<NewsItem>,
    /// True when the fingerprint matched and no estimator was called.
    pub reused: bool,
}

/// Turns a batch of headlines into one bounded sentiment score.
///
/// Holds the fingerprint of the last evaluated news set and its result, so
/// the same set is never sent to the estimators twice in a row.
pub struct SentimentFusion {
    estimators: Vec<Arc<dyn SentimentEstimator>>,
    relevance: Option<RelevanceFilter>,
    call_timeout: Duration,
    last: Option<(String, FusedSentiment)>,
}

impl SentimentFusion {
    pub fn new(
        estimators: Vec<Arc<dyn SentimentEstimator>>,
        relevance: Option<RelevanceFilter>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            estimators,
            relevance,
            call_timeout,
            last: None,
        }
    }

    /// Run one cycle over `raw` items.
    ///
    /// Returns only after every issued estimator call has answered, failed
    /// or timed out.
    pub async fn run_cycle(
        &mut self,
        raw: Vec<NewsItem>,
        relevance_threshold: u8,
        price: Option<f64>,
    ) -> FusionCycle {
        let mut news = dedupe(raw);
        if news.is_empty() {
            return FusionCycle {
                fused: FusedSentiment::unavailable("no news items"),
                news,
                reused: false,
            };
        }
        if let Some(filter) = &self.relevance {
            filter.annotate(&mut news);
        }

        let fp = fingerprint(&news);
        if let Some((last_fp, last_result)) = &self.last {
            if *last_fp == fp {
                debug!("News unchanged — reusing previous sentiment");
                return FusionCycle {
                    fused: last_result.clone(),
                    news,
                    reused: true,
                };
            }
        }

        let selected = relevant(&news, relevance_threshold);
        if selected.is_empty() {
            // Not committed: a lower threshold may select from the same set.
            return FusionCycle {
                fused: FusedSentiment::unavailable(format!(
                    "no headline reached relevance {relevance_threshold}"
                )),
                news,
                reused: false,
            };
        }
        let fused = if self.estimators.is_empty() {
            FusedSentiment::unavailable("no estimators configured")
        } else {
            info!(items = selected.len(), estimators = self.estimators.len(), "Querying sentiment estimators");
            let results = self.query(&selected, price).await;
            fuse(&results)
        };

        self.last = Some((fp, fused.clone()));
        FusionCycle {
            fused,
            news,
            reused: false,
        }
    }

    /// Ask every estimator concurrently, one call each.
    async fn query(&self, items: &[NewsItem], price: Option<f64>) -> Vec<(SentimentResult, f64)> {
        let prompt = build_prompt(items, price);
        let calls = self.estimators.iter().map(|est| {
            let prompt = prompt.as_str();
            async move {
                let name = est.name().to_string();
                let text = match tokio::time::timeout(self.call_timeout, est.score(prompt)).await {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => {
                        warn!(estimator = %name, error = %e, "Estimator call failed");
                        return None;
                    }
                    Err(_) => {
                        warn!(estimator = %name, timeout_secs = self.call_timeout.as_secs(), "Estimator call timed out");
                        return None;
                    }
                };
                let Some(score) = parse_score(&text) else {
                    warn!(estimator = %name, "No score in estimator answer");
                    return None;
                };
                debug!(estimator = %name, score, "Estimator answered");
                Some((
                    SentimentResult {
                        estimator: name,
                        score,
                        rationale: summarize(&text, RATIONALE_CHARS),
                    },
                    est.weight(),
                ))
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }
}

/// Weighted average of the responders, rounded to the nearest integer.
///
/// One responder passes through unchanged; none yields an unavailable
/// result. Non-positive total weight falls back to the plain mean.
pub fn fuse(results: &[(SentimentResult, f64)]) -> FusedSentiment {
    let rationale = results
        .iter()
        .map(|(r, _)| format!("[{}] {:+}: {}", r.estimator, r.score, r.rationale))
        .collect::<Vec<_>>()
        .join("\n");

    let score = match results {
        [] => return FusedSentiment::unavailable("all estimators failed"),
        [(only, _)] => only.score,
        _ => {
            let total_weight: f64 = results.iter().map(|(_, w)| w).sum();
            let mean = if total_weight.is_finite() && total_weight > 0.0 {
                results.iter().map(|(r, w)| r.score as f64 * w).sum::<f64>() / total_weight
            } else {
                results.iter().map(|(r, _)| r.score as f64).sum::<f64>() / results.len() as f64
            };
            mean.round() as i32
        }
    };

    FusedSentiment {
        score: score.clamp(SCORE_MIN, SCORE_MAX),
        rationale,
        contributors: results.len(),
        status: SentimentStatus::Available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Error, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEstimator {
        name: &'static str,
        weight: f64,
        answer: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl CountingEstimator {
        fn new(name: &'static str, weight: f64, answer: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                weight,
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SentimentEstimator for CountingEstimator {
        fn name(&self) -> &str {
            self.name
        }
        fn weight(&self) -> f64 {
            self.weight
        }
        async fn score(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(str::to_string)
                .ok_or_else(|| Error::Estimator("backend down".into()))
        }
    }

    struct SlowEstimator;

    #[async_trait]
    impl SentimentEstimator for SlowEstimator {
        fn name(&self) -> &str {
            "slow"
        }
        fn weight(&self) -> f64 {
            1.0
        }
        async fn score(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("Score: 9".into())
        }
    }

    fn news(titles: &[&str]) -> Vec<NewsItem> {
        titles
            .iter()
            .map(|t| NewsItem::new(*t, "https://example.com", "en", "test"))
            .collect()
    }

    fn result(name: &str, score: i32) -> SentimentResult {
        SentimentResult {
            estimator: name.into(),
            score,
            rationale: String::new(),
        }
    }

    #[test]
    fn weighted_fusion_rounds() {
        // (8 * 0.6 + 3 * 0.4) / 1.0 = 6.0
        let fused = fuse(&[(result("a", 8), 0.6), (result("b", 3), 0.4)]);
        assert_eq!(fused.score, 6);
        assert_eq!(fused.contributors, 2);
        assert!(fused.is_available());
    }

    #[test]
    fn single_responder_passes_through() {
        let fused = fuse(&[(result("a", -7), 0.1)]);
        assert_eq!(fused.score, -7);
    }

    #[test]
    fn no_responder_is_unavailable() {
        let fused = fuse(&[]);
        assert_eq!(fused.score, 0);
        assert_eq!(fused.status, SentimentStatus::Unavailable);
        assert!(fused.rationale.contains("unavailable"));
    }

    #[tokio::test]
    async fn identical_fingerprint_issues_no_new_calls() {
        let est = CountingEstimator::new("a", 1.0, Some("Score: 4"));
        let mut fusion = SentimentFusion::new(vec![est.clone()], None, Duration::from_secs(5));

        let first = fusion.run_cycle(news(&["Gold up", "Fed cautious"]), 0, Some(2000.0)).await;
        assert_eq!(est.calls.load(Ordering::SeqCst), 1);
        assert!(!first.reused);

        let second = fusion.run_cycle(news(&["Gold up", "Fed cautious"]), 0, Some(2010.0)).await;
        assert_eq!(est.calls.load(Ordering::SeqCst), 1);
        assert!(second.reused);
        assert_eq!(second.fused, first.fused);
    }

    #[tokio::test]
    async fn duplicate_titles_share_one_fingerprint() {
        let est = CountingEstimator::new("a", 1.0, Some("Score: 2"));
        let mut fusion = SentimentFusion::new(vec![est.clone()], None, Duration::from_secs(5));
        fusion.run_cycle(news(&["Gold up"]), 0, None).await;

        let mut dup = news(&["Gold up"]);
        dup.push(NewsItem::new("Gold up", "https://other.example", "en", "other-feed"));
        let cycle = fusion.run_cycle(dup, 0, None).await;
        assert!(cycle.reused);
        assert_eq!(cycle.news.len(), 1);
        assert_eq!(est.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_estimator_does_not_abort_the_others() {
        let good = CountingEstimator::new("good", 0.6, Some("Sentiment: firm\nScore: 6"));
        let bad = CountingEstimator::new("bad", 0.4, None);
        let garbled = CountingEstimator::new("garbled", 0.4, Some("no idea"));
        let mut fusion = SentimentFusion::new(
            vec![good.clone(), bad.clone(), garbled.clone()],
            None,
            Duration::from_secs(5),
        );
        let cycle = fusion.run_cycle(news(&["Gold up"]), 0, None).await;
        assert_eq!(cycle.fused.score, 6);
        assert_eq!(cycle.fused.contributors, 1);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_failed_is_unavailable_and_reused() {
        let bad = CountingEstimator::new("bad", 1.0, None);
        let mut fusion = SentimentFusion::new(vec![bad.clone()], None, Duration::from_secs(5));
        let first = fusion.run_cycle(news(&["Gold up"]), 0, None).await;
        assert!(!first.fused.is_available());

        let second = fusion.run_cycle(news(&["Gold up"]), 0, None).await;
        assert!(second.reused);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_estimator_times_out() {
        let fast = CountingEstimator::new("fast", 1.0, Some("Score: -3"));
        let mut fusion = SentimentFusion::new(
            vec![fast, Arc::new(SlowEstimator)],
            None,
            Duration::from_millis(50),
        );
        let cycle = tokio::time::timeout(
            Duration::from_secs(5),
            fusion.run_cycle(news(&["Gold down"]), 0, None),
        )
        .await
        .expect("cycle must finish once the timeout fires");
        assert_eq!(cycle.fused.score, -3);
        assert_eq!(cycle.fused.contributors, 1);
    }

    #[tokio::test]
    async fn empty_news_is_unavailable_without_calls() {
        let est = CountingEstimator::new("a", 1.0, Some("Score: 4"));
        let mut fusion = SentimentFusion::new(vec![est.clone()], None, Duration::from_secs(5));
        let cycle = fusion.run_cycle(Vec::new(), 0, None).await;
        assert!(!cycle.fused.is_available());
        assert_eq!(est.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn irrelevant_news_is_not_sent() {
        use std::collections::HashMap;
        let est = CountingEstimator::new("a", 1.0, Some("Score: 4"));
        let filter = RelevanceFilter::new(&HashMap::from([("gold".to_string(), 4)]));
        let mut fusion = SentimentFusion::new(vec![est.clone()], Some(filter), Duration::from_secs(5));

        let cycle = fusion.run_cycle(news(&["Tech stocks slide"]), 3, None).await;
        assert!(!cycle.fused.is_available());
        assert_eq!(cycle.news[0].relevance, Some(0));
        assert_eq!(est.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lower_threshold_scores_news_filtered_out_earlier() {
        use std::collections::HashMap;
        let est = CountingEstimator::new("a", 1.0, Some("Score: 5"));
        let filter = RelevanceFilter::new(&HashMap::from([("gold".to_string(), 4)]));
        let mut fusion = SentimentFusion::new(vec![est.clone()], Some(filter), Duration::from_secs(5));

        let sentry = fusion.run_cycle(news(&["Gold rallies"]), 6, None).await;
        assert!(!sentry.fused.is_available());
        assert_eq!(est.calls.load(Ordering::SeqCst), 0);

        let active = fusion.run_cycle(news(&["Gold rallies"]), 3, None).await;
        assert!(!active.reused);
        assert_eq!(active.fused.available_score(), Some(5));
        assert_eq!(est.calls.load(Ordering::SeqCst), 1);

        let again = fusion.run_cycle(news(&["Gold rallies"]), 3, None).await;
        assert!(again.reused);
        assert_eq!(est.calls.load(Ordering::SeqCst), 1);
    }
}
