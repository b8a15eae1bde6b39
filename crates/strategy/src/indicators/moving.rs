/// Simple moving average of the last `period` values at every bar.
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for end in period..=values.len() {
        let window = &values[end - period..end];
        out[end - 1] = Some(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Exponential moving average with smoothing `2 / (period + 1)`.
///
/// Seeded with the SMA of the first `period` values, so the first defined
/// value sits at index `period - 1`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);
    for (i, &value) in values.iter().enumerate().skip(period) {
        ema = value * k + ema * (1.0 - k);
        out[i] = Some(ema);
    }
    out
}

/// Apply `f` to the defined tail of `series`, keeping alignment.
///
/// Indicator series are `None` for a prefix and then defined to the end;
/// this lets a second-stage average run over the defined part only.
pub(crate) fn over_defined(
    series: &[Option<f64>],
    f: impl FnOnce(&[f64]) -> Vec<Option<f64>>,
) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    let Some(start) = series.iter().position(Option::is_some) else {
        return out;
    };
    let defined: Vec<f64> = series[start..].iter().map_while(|v| *v).collect();
    for (offset, value) in f(&defined).into_iter().enumerate() {
        out[start + offset] = value;
    }
    out
}
