use proptest::prelude::*;
use common::{SentimentResult, SentimentStatus};
use sentiment::estimator::parse_score;
use sentiment::fuse;

fn contribution() -> impl Strategy<Value = (SentimentResult, f64)> {
    (-10i32..=10, prop_oneof![0.0f64..5.0, Just(0.0), Just(-1.0)]).prop_map(|(score, weight)| {
        (
            SentimentResult {
                estimator: "est".into(),
                score,
                rationale: String::new(),
            },
            weight,
        )
    })
}

proptest! {
    /// The fused score stays in [-10, 10] for any mix of responders and weights.
    #[test]
    fn fused_score_is_bounded(results in prop::collection::vec(contribution(), 0..6)) {
        let fused = fuse(&results);
        prop_assert!((-10..=10).contains(&fused.score));
        prop_assert_eq!(fused.contributors, results.len());
        if results.is_empty() {
            prop_assert_eq!(fused.status, SentimentStatus::Unavailable);
            prop_assert_eq!(fused.score, 0);
        }
        if results.len() == 1 {
            prop_assert_eq!(fused.score, results[0].0.score);
        }
    }

    /// Whatever number an estimator writes, the parsed score is clamped.
    #[test]
    fn parsed_score_is_clamped(n in any::<i64>(), prefix in "[a-z ]{0,20}") {
        let text = format!("{prefix}\nScore: {n}");
        let score = parse_score(&text).unwrap();
        prop_assert!((-10..=10).contains(&score));
        prop_assert_eq!(score as i64, n.clamp(-10, 10));
    }
}
