use proptest::prelude::*;
use common::OverfitVerdict;
use optimizer::backtest::position_fraction;
use optimizer::metrics::sharpe_ratio;
use optimizer::search::overfit_verdict;
use optimizer::{ParameterSpace, TrialScore};

proptest! {
    /// Position size always lands inside the clamp.
    #[test]
    fn fraction_is_clamped(
        equity in 1.0f64..10_000_000.0,
        entry in 0.01f64..100_000.0,
        distance in 0.0f64..10_000.0,
        risk in 0.001f64..1.0,
    ) {
        let f = position_fraction(equity, entry, entry - distance, risk);
        prop_assert!((0.1..=0.95).contains(&f));
    }

    /// Sharpe is either a finite number or NaN, never infinite.
    #[test]
    fn sharpe_is_finite_or_nan(curve in prop::collection::vec(1.0f64..1_000_000.0, 0..200)) {
        let s = sharpe_ratio(&curve, 252.0);
        prop_assert!(s.is_finite() || s.is_nan());
    }

    /// Any scored trial outranks every unscored one.
    #[test]
    fn scored_beats_unscored(v in -1_000.0f64..1_000.0) {
        prop_assert!(TrialScore::Scored(v) > TrialScore::Degenerate);
        prop_assert!(TrialScore::Scored(v) > TrialScore::Failed);
        prop_assert!(TrialScore::Scored(v) > TrialScore::NoTrades);
    }

    /// A test score at least as good as the train score is never overfit.
    #[test]
    fn improvement_is_low_overfit(train in 0.01f64..10.0, gain in 0.0f64..10.0) {
        let (_, verdict) = overfit_verdict(Some(train), Some(train + gain));
        prop_assert_eq!(verdict, OverfitVerdict::Low);
    }

    /// Sampling never exceeds the trial cap and never repeats a point.
    #[test]
    fn sampled_candidates_are_distinct(max in 1usize..400, seed in any::<u64>()) {
        let space = ParameterSpace::default();
        let c = space.candidates(max, seed);
        prop_assert_eq!(c.len(), max.min(space.grid_size()));
        for (i, a) in c.iter().enumerate() {
            prop_assert!(c[i + 1..].iter().all(|b| b != a));
        }
    }
}
