use common::{closes, Candle, Side, Signal};

use crate::indicators::{ema, last_two, macd};
use crate::Strategy;

/// MACD histogram zero cross confirmed by a close back through the retest EMA.
///
/// LONG when the histogram turns positive on the bar that closes back above
/// the retest EMA; SHORT mirrored. The slope of the bias EMA on the same
/// timeframe blocks counter-trend entries. Levels come from a range proxy for
/// ATR, `(highest high - lowest low) / atr_window` over the last `atr_window`
/// bars, and the signal is dropped when that proxy is outside the
/// `atr_pct_min..=atr_pct_max` band relative to price.
pub struct MacdRetest {
    name: String,
    timeframe: String,
    fast: usize,
    slow: usize,
    signal: usize,
    retest_period: usize,
    bias_period: usize,
    atr_window: usize,
    atr_pct_min: f64,
    atr_pct_max: f64,
    sl_mult: f64,
    tp_mult: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bias {
    Up,
    Down,
    Flat,
}

impl Bias {
    fn as_str(self) -> &'static str {
        match self {
            Bias::Up => "up",
            Bias::Down => "down",
            Bias::Flat => "flat",
        }
    }
}

impl MacdRetest {
    pub fn new(name: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeframe: timeframe.into(),
            fast: 12,
            slow: 26,
            signal: 9,
            retest_period: 20,
            bias_period: 200,
            atr_window: 14,
            atr_pct_min: 0.0015,
            atr_pct_max: 0.03,
            sl_mult: 1.0,
            tp_mult: 1.5,
        }
    }

    pub fn with_macd(mut self, fast: usize, slow: usize, signal: usize) -> Self {
        self.fast = fast;
        self.slow = slow;
        self.signal = signal;
        self
    }

    pub fn with_retest_period(mut self, period: usize) -> Self {
        self.retest_period = period;
        self
    }

    pub fn with_bias_period(mut self, period: usize) -> Self {
        self.bias_period = period;
        self
    }

    pub fn with_atr_band(mut self, window: usize, min_pct: f64, max_pct: f64) -> Self {
        self.atr_window = window.max(1);
        self.atr_pct_min = min_pct;
        self.atr_pct_max = max_pct;
        self
    }

    pub fn with_multipliers(mut self, sl_mult: f64, tp_mult: f64) -> Self {
        self.sl_mult = sl_mult;
        self.tp_mult = tp_mult;
        self
    }

    fn bias(&self, series: &[f64]) -> Option<Bias> {
        let (prev, curr) = last_two(&ema(series, self.bias_period))?;
        let slope = curr - prev;
        Some(if slope > 0.0 {
            Bias::Up
        } else if slope < 0.0 {
            Bias::Down
        } else {
            Bias::Flat
        })
    }

    fn range_atr(&self, candles: &[Candle]) -> Option<f64> {
        let tail = candles.get(candles.len().checked_sub(self.atr_window)?..)?;
        let high = tail.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = tail.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        Some((high - low) / self.atr_window as f64)
    }
}

impl Strategy for MacdRetest {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> &str {
        &self.timeframe
    }

    fn min_candles(&self) -> usize {
        60.max(self.slow + self.signal)
            .max(self.bias_period + 1)
            .max(self.retest_period + 1)
            .max(self.atr_window)
    }

    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal> {
        if candles.len() < self.min_candles() {
            return Vec::new();
        }
        let series = closes(candles);
        let (Some((h1, h0)), Some((e1, e0)), Some(bias), Some(atr)) = (
            last_two(&macd(&series, self.fast, self.slow, self.signal).histogram),
            last_two(&ema(&series, self.retest_period)),
            self.bias(&series),
            self.range_atr(candles),
        ) else {
            return Vec::new();
        };
        let (c1, c0) = (series[series.len() - 2], series[series.len() - 1]);

        let atr_pct = atr / c0.max(1e-9);
        if !(self.atr_pct_min..=self.atr_pct_max).contains(&atr_pct) {
            return Vec::new();
        }

        let long = h1 <= 0.0 && h0 > 0.0 && c1 <= e1 && c0 > e0 && bias != Bias::Down;
        let short = h1 >= 0.0 && h0 < 0.0 && c1 >= e1 && c0 < e0 && bias != Bias::Up;

        let (side, direction, sl, tp) = if long {
            (Side::Long, "up", c0 - self.sl_mult * atr, c0 + self.tp_mult * atr)
        } else if short {
            (Side::Short, "down", c0 + self.sl_mult * atr, c0 - self.tp_mult * atr)
        } else {
            return Vec::new();
        };

        let reason = format!(
            "MACD {direction} cross + EMA{} retest (ATR%={:.3}%, bias={}, RR≈{:.2})",
            self.retest_period,
            atr_pct * 100.0,
            bias.as_str(),
            self.tp_mult / self.sl_mult,
        );
        vec![Signal::new(symbol, side, &self.name, &self.timeframe, reason)
            .with_entry(c0)
            .with_levels(sl, tp)
            .with_meta("atr", atr)
            .with_meta("atr_pct", atr_pct)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testutil::from_closes;

    fn strategy() -> MacdRetest {
        MacdRetest::new("macd_retest_5m", "5m")
    }

    /// 220 rising bars, a 10 bar pullback below EMA20, then one bar closing `jump` higher.
    fn pullback_then_reclaim(start: f64, step: f64, jump: f64) -> Vec<f64> {
        let mut closes: Vec<f64> = (0..220).map(|i| start + step * i as f64).collect();
        let top = *closes.last().unwrap();
        closes.extend((1..=10).map(|i| top - i as f64));
        closes.push(top - 10.0 + jump);
        closes
    }

    #[test]
    fn reclaim_with_histogram_cross_is_long() {
        let closes = pullback_then_reclaim(100.0, 0.5, 80.0);
        let signals = strategy().evaluate(&from_closes(&closes), "BTCUSDT");
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.side, Side::Long);
        assert!(s.reason.starts_with("MACD up cross + EMA20 retest (ATR%=2.0"));
        assert!(s.reason.contains("bias=up") && s.reason.ends_with("RR≈1.50)"));

        let (entry, sl, tp) = (s.entry.unwrap(), s.sl.unwrap(), s.tp.unwrap());
        assert_eq!(entry, 279.5);
        // range over the last 14 bars: 199.5..279.5
        let atr = 80.0 / 14.0;
        assert!((entry - sl - atr).abs() < 1e-9);
        assert!((tp - entry - 1.5 * atr).abs() < 1e-9);
    }

    #[test]
    fn mirrored_breakdown_is_short() {
        let closes: Vec<f64> = pullback_then_reclaim(100.0, 0.5, 80.0).iter().map(|c| 500.0 - c).collect();
        let signals = strategy().evaluate(&from_closes(&closes), "BTCUSDT");
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.side, Side::Short);
        assert!(s.reason.starts_with("MACD down cross + EMA20 retest"));
        assert!(s.reason.contains("bias=down"));
        assert!(s.sl.unwrap() > s.entry.unwrap() && s.tp.unwrap() < s.entry.unwrap());
    }

    #[test]
    fn volatility_outside_band_is_rejected() {
        let candles = from_closes(&pullback_then_reclaim(100.0, 0.5, 80.0));
        // ATR% here is about 2.04%
        let too_calm_cap = strategy().with_atr_band(14, 0.0015, 0.01);
        assert!(too_calm_cap.evaluate(&candles, "BTCUSDT").is_empty());
        let too_high_floor = strategy().with_atr_band(14, 0.025, 0.05);
        assert!(too_high_floor.evaluate(&candles, "BTCUSDT").is_empty());
    }

    #[test]
    fn counter_trend_cross_is_blocked_by_bias() {
        // Falling EMA200: the reclaim bar alone cannot turn its slope.
        let mut closes: Vec<f64> = (0..230).map(|i| 400.0 - 0.9 * i as f64).collect();
        let bottom = 400.0 - 0.9 * 219.0 - 10.0;
        for (i, c) in closes.iter_mut().skip(220).enumerate() {
            *c = 400.0 - 0.9 * 219.0 - (i + 1) as f64;
        }
        closes.push(bottom + 40.0);
        let candles = from_closes(&closes);

        assert!(strategy().evaluate(&candles, "BTCUSDT").is_empty());
        let unbiased = strategy().with_bias_period(1);
        let signals = unbiased.evaluate(&candles, "BTCUSDT");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Long);
    }

    #[test]
    fn short_window_is_ignored() {
        let closes = pullback_then_reclaim(100.0, 0.5, 80.0);
        let candles = from_closes(&closes[closes.len() - 150..]);
        assert_eq!(strategy().min_candles(), 201);
        assert!(strategy().evaluate(&candles, "BTCUSDT").is_empty());
    }

    #[test]
    fn flat_series_is_neutral() {
        let candles = from_closes(&[100.0; 260]);
        assert!(strategy().evaluate(&candles, "BTCUSDT").is_empty());
    }
}
