use common::{closes, Candle, Side, Signal};

use crate::indicators::{last_two, rsi};
use crate::Strategy;

/// LONG when RSI crosses back up through `oversold`, SHORT when it crosses
/// back down through `overbought`.
pub struct RsiReversal {
    name: String,
    timeframe: String,
    period: usize,
    overbought: f64,
    oversold: f64,
}

impl RsiReversal {
    pub fn new(
        name: impl Into<String>,
        timeframe: impl Into<String>,
        period: usize,
        overbought: f64,
        oversold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            timeframe: timeframe.into(),
            period,
            overbought,
            oversold,
        }
    }
}

impl Strategy for RsiReversal {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> &str {
        &self.timeframe
    }

    fn min_candles(&self) -> usize {
        self.period + 2
    }

    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal> {
        let Some((prev, curr)) = last_two(&rsi(&closes(candles), self.period)) else {
            return Vec::new();
        };

        let (side, reason) = if prev <= self.oversold && curr > self.oversold {
            (Side::Long, format!("RSI{} crossed above {:.0} ({curr:.1})", self.period, self.oversold))
        } else if prev >= self.overbought && curr < self.overbought {
            (Side::Short, format!("RSI{} crossed below {:.0} ({curr:.1})", self.period, self.overbought))
        } else {
            return Vec::new();
        };

        vec![Signal::new(symbol, side, &self.name, &self.timeframe, reason)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testutil::from_closes;

    fn strategy() -> RsiReversal {
        RsiReversal::new("rsi_reversal_5m", "5m", 14, 70.0, 30.0)
    }

    fn first_signal(closes: &mut Vec<f64>, next: impl Fn(usize) -> f64) -> Option<Signal> {
        for i in 0..40 {
            closes.push(next(i));
            if let Some(s) = strategy().evaluate(&from_closes(closes), "SOLUSDT").into_iter().next() {
                return Some(s);
            }
        }
        None
    }

    #[test]
    fn recovery_from_oversold_is_long() {
        let mut closes: Vec<f64> = (0..30).map(|i| 200.0 - 2.0 * i as f64).collect();
        let last = *closes.last().unwrap();
        let signal = first_signal(&mut closes, |i| last + 3.0 * (i + 1) as f64).expect("expected LONG");
        assert_eq!(signal.side, Side::Long);
        assert!(signal.reason.starts_with("RSI14 crossed above 30"));
    }

    #[test]
    fn fade_from_overbought_is_short() {
        // every fifth bar dips so the average loss is non-zero
        let mut closes: Vec<f64> = (0..30)
            .map(|i| 100.0 + 2.0 * i as f64 - if i % 5 == 4 { 3.0 } else { 0.0 })
            .collect();
        let last = *closes.last().unwrap();
        let signal = first_signal(&mut closes, |i| last - 3.0 * (i + 1) as f64).expect("expected SHORT");
        assert_eq!(signal.side, Side::Short);
    }

    #[test]
    fn flat_series_is_neutral() {
        let candles = from_closes(&[100.0; 60]);
        assert!(strategy().evaluate(&candles, "SOLUSDT").is_empty());
    }
}
