use common::{closes, Candle, Side, Signal};

use crate::indicators::{ema, last_two};
use crate::Strategy;

/// Dual EMA crossover on the last two closed bars.
pub struct EmaCross {
    name: String,
    timeframe: String,
    fast: usize,
    slow: usize,
}

impl EmaCross {
    pub fn new(name: impl Into<String>, timeframe: impl Into<String>, fast: usize, slow: usize) -> Self {
        Self {
            name: name.into(),
            timeframe: timeframe.into(),
            fast,
            slow,
        }
    }
}

impl Strategy for EmaCross {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> &str {
        &self.timeframe
    }

    fn min_candles(&self) -> usize {
        self.fast.max(self.slow) + 1
    }

    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal> {
        let series = closes(candles);
        let (Some((f_prev, f_curr)), Some((s_prev, s_curr))) =
            (last_two(&ema(&series, self.fast)), last_two(&ema(&series, self.slow)))
        else {
            return Vec::new();
        };

        let (side, reason) = if f_prev <= s_prev && f_curr > s_curr {
            (Side::Long, format!("EMA{}>EMA{}", self.fast, self.slow))
        } else if f_prev >= s_prev && f_curr < s_curr {
            (Side::Short, format!("EMA{}<EMA{}", self.fast, self.slow))
        } else {
            return Vec::new();
        };

        vec![Signal::new(symbol, side, &self.name, &self.timeframe, reason)]
    }
}
