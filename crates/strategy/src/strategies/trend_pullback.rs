use common::{closes, Candle, Side, Signal};

use crate::indicators::{ema, last_two};
use crate::Strategy;

/// Trend filter on EMA(fast) vs EMA(slow); fires when price reclaims the fast
/// EMA after a pullback through it.
pub struct TrendPullback {
    name: String,
    timeframe: String,
    fast: usize,
    slow: usize,
}

impl TrendPullback {
    pub fn new(name: impl Into<String>, timeframe: impl Into<String>, fast: usize, slow: usize) -> Self {
        Self {
            name: name.into(),
            timeframe: timeframe.into(),
            fast,
            slow,
        }
    }
}

impl Strategy for TrendPullback {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> &str {
        &self.timeframe
    }

    fn min_candles(&self) -> usize {
        self.fast.max(self.slow) + 2
    }

    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal> {
        if candles.len() < 3 || candles.len() < self.min_candles() {
            return Vec::new();
        }
        let series = closes(candles);
        let (Some((fast_prev, fast_curr)), Some((slow_prev, _))) =
            (last_two(&ema(&series, self.fast)), last_two(&ema(&series, self.slow)))
        else {
            return Vec::new();
        };
        let c_prev = series[series.len() - 2];
        let c_curr = series[series.len() - 1];

        let (side, reason) = if fast_prev > slow_prev && c_prev < fast_prev && c_curr > fast_curr {
            (Side::Long, format!("PullbackAboveEMA{}", self.fast))
        } else if fast_prev < slow_prev && c_prev > fast_prev && c_curr < fast_curr {
            (Side::Short, format!("PullbackBelowEMA{}", self.fast))
        } else {
            return Vec::new();
        };

        vec![Signal::new(symbol, side, &self.name, &self.timeframe, reason)]
    }
}
