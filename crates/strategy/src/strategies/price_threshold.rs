use common::{Candle, Side, Signal};

use crate::Strategy;

/// Fires LONG on the bar whose close crosses above `threshold`.
///
/// Uses a crossing test, not a level test, so a price that stays above the
/// threshold does not fire again. Process-lifetime "only once" is applied by
/// the caller when the strategy is configured with `fire_once`.
pub struct PriceThreshold {
    name: String,
    timeframe: String,
    threshold: f64,
    band_pct: f64,
}

impl PriceThreshold {
    pub fn new(name: impl Into<String>, timeframe: impl Into<String>, threshold: f64, band_pct: f64) -> Self {
        Self {
            name: name.into(),
            timeframe: timeframe.into(),
            threshold,
            band_pct,
        }
    }
}

impl Strategy for PriceThreshold {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> &str {
        &self.timeframe
    }

    fn min_candles(&self) -> usize {
        2
    }

    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal> {
        let [.., prev, curr] = candles else {
            return Vec::new();
        };
        if !(prev.close <= self.threshold && curr.close > self.threshold) {
            return Vec::new();
        }

        let entry = curr.close;
        vec![Signal::new(
            symbol,
            Side::Long,
            &self.name,
            &self.timeframe,
            format!("Close crossed above {:.2}", self.threshold),
        )
        .with_entry(entry)
        .with_levels(entry * (1.0 - self.band_pct), entry * (1.0 + self.band_pct))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testutil::from_closes;

    fn strategy() -> PriceThreshold {
        PriceThreshold::new("btc_price_gt_threshold", "1m", 100.0, 0.02)
    }

    #[test]
    fn fires_on_the_crossing_bar() {
        let candles = from_closes(&[98.0, 99.0, 101.0]);
        let signals = strategy().evaluate(&candles, "BTCUSDT");
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.side, Side::Long);
        assert_eq!(s.entry, Some(101.0));
        assert!((s.sl.unwrap() - 98.98).abs() < 1e-9);
        assert!((s.tp.unwrap() - 103.02).abs() < 1e-9);
    }

    #[test]
    fn fires_exactly_once_while_price_stays_above() {
        let mut closes = vec![99.0; 20];
        closes.push(101.0);
        closes.extend(std::iter::repeat(101.5).take(50));
        let candles = from_closes(&closes);

        let s = strategy();
        let fired: usize = (2..=candles.len())
            .map(|end| s.evaluate(&candles[..end], "BTCUSDT").len())
            .sum();
        assert_eq!(fired, 1);
    }

    #[test]
    fn touching_the_threshold_is_not_a_cross() {
        let candles = from_closes(&[99.0, 100.0]);
        assert!(strategy().evaluate(&candles, "BTCUSDT").is_empty());
    }

    #[test]
    fn short_window_yields_nothing() {
        assert!(strategy().evaluate(&from_closes(&[101.0]), "BTCUSDT").is_empty());
        assert!(strategy().evaluate(&[], "BTCUSDT").is_empty());
    }
}
