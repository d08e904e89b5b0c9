use common::Candle;

/// True range per candle: `high - low` for the first, then the largest of
/// `high - low`, `|high - prev_close|` and `|low - prev_close|`.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut prev_close: Option<f64> = None;
    candles
        .iter()
        .map(|c| {
            let tr = match prev_close {
                None => c.high - c.low,
                Some(pc) => (c.high - c.low)
                    .max((c.high - pc).abs())
                    .max((c.low - pc).abs()),
            };
            prev_close = Some(c.close);
            tr
        })
        .collect()
}

/// Average True Range with Wilder smoothing.
///
/// The `period`-th value is the mean of the first `period` true ranges, then
/// `atr[i] = (atr[i-1] * (period - 1) + tr[i]) / period`. Fewer than `period`
/// candles yields an all-`None` series.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let trs = true_range(candles);
    if period == 0 || trs.len() < period {
        return vec![None; trs.len()];
    }

    let mut out = Vec::with_capacity(trs.len());
    out.extend(std::iter::repeat(None).take(period - 1));

    let mut prev = trs[..period].iter().sum::<f64>() / period as f64;
    out.push(Some(prev));

    for &tr in &trs[period..] {
        prev = (prev * (period - 1) as f64 + tr) / period as f64;
        out.push(Some(prev));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            close_time: 0,
        }
    }

    #[test]
    fn true_range_uses_previous_close_gap() {
        let candles = vec![candle(11.0, 9.0, 10.0), candle(15.0, 14.0, 14.5)];
        let trs = true_range(&candles);
        assert_eq!(trs[0], 2.0);
        // gap up: |15 - 10| dominates 1.0
        assert_eq!(trs[1], 5.0);
    }

    #[test]
    fn atr_is_undefined_with_insufficient_history() {
        let candles = vec![candle(11.0, 9.0, 10.0); 13];
        assert!(atr(&candles, 14).iter().all(Option::is_none));
    }

    #[test]
    fn atr_seed_is_mean_of_first_period() {
        let candles = vec![candle(12.0, 10.0, 11.0); 14];
        let out = atr(&candles, 14);
        assert_eq!(out.len(), 14);
        assert!(out[12].is_none());
        assert!((out[13].unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn atr_flat_series_converges_to_zero() {
        let candles = vec![candle(100.0, 100.0, 100.0); 50];
        let out = atr(&candles, 14);
        assert_eq!(out.last().copied().flatten(), Some(0.0));
    }

    #[test]
    fn atr_decays_towards_zero_after_volatility_stops() {
        let mut candles = vec![candle(110.0, 90.0, 100.0); 14];
        candles.extend(vec![candle(100.0, 100.0, 100.0); 200]);
        let last = atr(&candles, 14).last().copied().flatten().unwrap();
        assert!(last < 1e-4, "ATR should decay, got {last}");
    }
}
