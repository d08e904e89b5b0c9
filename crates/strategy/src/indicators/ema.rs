/// Exponential moving average of `series` (oldest first).
///
/// The first `period - 1` outputs are `None`; the `period`-th is seeded with
/// the simple average of the first `period` values, and later values use
/// `k = 2 / (period + 1)`. With `period <= 1` the input is returned as-is.
pub fn ema(series: &[f64], period: usize) -> Vec<Option<f64>> {
    if series.is_empty() || period <= 1 {
        return series.iter().copied().map(Some).collect();
    }
    if series.len() < period {
        return vec![None; series.len()];
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    out.extend(std::iter::repeat(None).take(period - 1));

    let mut prev = series[..period].iter().sum::<f64>() / period as f64;
    out.push(Some(prev));

    for &price in &series[period..] {
        prev += k * (price - prev);
        out.push(Some(prev));
    }
    out
}
