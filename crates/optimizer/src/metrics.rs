//! Performance metrics over a per-bar equity curve.

/// Simple returns between consecutive equity points.
pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Annualized Sharpe ratio of per-bar returns (risk-free rate 0).
///
/// Sharpe = mean / sample_std * sqrt(periods_per_year). NaN when fewer than
/// two returns exist or the returns have no variance; callers decide how to
/// rank that.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return f64::NAN;
    }
    let mean = mean(&returns);
    let std = std_dev(&returns);
    if std < 1e-15 {
        return f64::NAN;
    }
    mean / std * periods_per_year.sqrt()
}

/// Total return of the curve as a fraction (0.05 = +5%).
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Largest peak-to-trough fall as a fraction of the peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0f64;
    for &value in equity_curve {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
