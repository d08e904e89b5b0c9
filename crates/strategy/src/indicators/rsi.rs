/// RSI (Relative Strength Index) with Wilder smoothing.
///
/// Outputs are `None` for the first `period` positions (one change is needed
/// per sample). When the average loss is zero the value is clamped to 50
/// instead of dividing by zero.
pub fn rsi(series: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || series.len() < period + 1 {
        return vec![None; series.len()];
    }

    let changes: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    let initial = &changes[..period];

    let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
        / period as f64;

    let mut out = vec![None; period];
    out.push(Some(value(avg_gain, avg_loss)));

    for &change in &changes[period..] {
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { change.abs() } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out.push(Some(value(avg_gain, avg_loss)));
    }
    out
}

fn value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 50.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
