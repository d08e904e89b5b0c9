use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Candle, Error, PricedSignal, Result, Side, Signal};
use strategy::indicators::{atr, last};

/// User-configurable risk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Stop distance in ATRs.
    pub sl_mult: f64,
    /// Target distance in ATRs.
    pub tp_mult: f64,
    pub atr_period: usize,
    /// Fallback stop when ATR is undefined (0.005 = 0.5%).
    pub static_sl_pct: f64,
    /// Fallback target when ATR is undefined (0.01 = 1%).
    pub static_tp_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sl_mult: 1.0,
            tp_mult: 2.0,
            atr_period: 14,
            static_sl_pct: 0.005,
            static_tp_pct: 0.01,
        }
    }
}

impl RiskConfig {
    pub fn with_multiples(sl_mult: f64, tp_mult: f64) -> Self {
        Self {
            sl_mult,
            tp_mult,
            ..Self::default()
        }
    }
}

/// Percentage stop/target around `price`, mirrored by side. Returns `(sl, tp)`.
pub fn static_levels(side: Side, price: f64, sl_pct: f64, tp_pct: f64) -> (f64, f64) {
    match side {
        Side::Long => (price * (1.0 - sl_pct), price * (1.0 + tp_pct)),
        Side::Short => (price * (1.0 + sl_pct), price * (1.0 - tp_pct)),
    }
}

/// Resolves the missing price fields of a [`Signal`].
///
/// Precedence per field is fixed: what the strategy supplied, then
/// `close ∓ mult * ATR`, then the static percentage fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAttacher {
    config: RiskConfig,
}

impl RiskAttacher {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Price `signal` against the window it was evaluated on.
    pub fn attach(&self, signal: Signal, candles: &[Candle]) -> Result<PricedSignal> {
        let last_candle = candles
            .last()
            .ok_or_else(|| Error::MalformedSignal(format!("{}: no candle to price against", signal.symbol)))?;
        let atr_value = last(&atr(candles, self.config.atr_period));
        self.attach_with(signal, last_candle, atr_value)
    }

    /// Price `signal` from an explicit last candle and ATR value.
    pub fn attach_with(&self, signal: Signal, last_candle: &Candle, atr_value: Option<f64>) -> Result<PricedSignal> {
        signal.validate()?;
        let close = last_candle.close;
        let side = signal.side;

        let derived = match atr_value.filter(|a| a.is_finite() && *a > 0.0) {
            Some(a) => {
                debug!(symbol = %signal.symbol, atr = a, "ATR levels");
                match side {
                    Side::Long => (close - self.config.sl_mult * a, close + self.config.tp_mult * a),
                    Side::Short => (close + self.config.sl_mult * a, close - self.config.tp_mult * a),
                }
            }
            None => static_levels(side, close, self.config.static_sl_pct, self.config.static_tp_pct),
        };

        let priced = PricedSignal {
            entry: signal.entry.unwrap_or(close),
            sl: signal.sl.unwrap_or(derived.0),
            tp: signal.tp.unwrap_or(derived.1),
            entry_time: signal.entry_time.unwrap_or(last_candle.close_time),
            explicit_entry_time: signal.entry_time.is_some(),
            symbol: signal.symbol,
            side,
            strategy: signal.strategy,
            timeframe: signal.timeframe,
            reason: signal.reason,
            meta: signal.meta,
        };

        for (field, v) in [("entry", priced.entry), ("sl", priced.sl), ("tp", priced.tp)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(Error::MalformedSignal(format!(
                    "{} {}: resolved {field} is not a positive price: {v}",
                    priced.symbol, priced.strategy
                )));
            }
        }
        Ok(priced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64) -> Candle {
        Candle {
            open_time: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            close_time: 299_999,
        }
    }

    fn signal(side: Side) -> Signal {
        Signal::new("BTCUSDT", side, "test", "5m", "because")
    }

    #[test]
    fn explicit_levels_pass_through_unchanged() {
        let attacher = RiskAttacher::default();
        let sig = signal(Side::Short)
            .with_entry(101.0)
            .with_levels(105.0, 93.0)
            .with_entry_time(42);
        let priced = attacher.attach_with(sig, &candle(100.0), Some(3.0)).unwrap();
        assert_eq!((priced.entry, priced.sl, priced.tp), (101.0, 105.0, 93.0));
        assert_eq!(priced.entry_time, 42);
        assert!(priced.explicit_entry_time);
    }

    #[test]
    fn atr_levels_for_long_and_short() {
        let attacher = RiskAttacher::new(RiskConfig::with_multiples(1.5, 3.0));

        let long = attacher.attach_with(signal(Side::Long), &candle(100.0), Some(2.0)).unwrap();
        assert_eq!((long.sl, long.tp), (97.0, 106.0));

        let short = attacher.attach_with(signal(Side::Short), &candle(100.0), Some(2.0)).unwrap();
        assert_eq!((short.sl, short.tp), (103.0, 94.0));
    }

    #[test]
    fn static_fallback_without_atr() {
        let attacher = RiskAttacher::default();
        let long = attacher.attach_with(signal(Side::Long), &candle(200.0), None).unwrap();
        assert!((long.sl - 199.0).abs() < 1e-9);
        assert!((long.tp - 202.0).abs() < 1e-9);

        let short = attacher.attach_with(signal(Side::Short), &candle(200.0), Some(0.0)).unwrap();
        assert!((short.sl - 201.0).abs() < 1e-9);
        assert!((short.tp - 198.0).abs() < 1e-9);
    }

    #[test]
    fn missing_entry_and_time_default_to_last_candle() {
        let priced = RiskAttacher::default()
            .attach_with(signal(Side::Long), &candle(50.0), None)
            .unwrap();
        assert_eq!(priced.entry, 50.0);
        assert_eq!(priced.entry_time, 299_999);
        assert!(!priced.explicit_entry_time);
    }

    #[test]
    fn partial_levels_fill_only_the_missing_field() {
        let mut sig = signal(Side::Long);
        sig.sl = Some(90.0);
        let priced = RiskAttacher::default().attach_with(sig, &candle(100.0), Some(5.0)).unwrap();
        assert_eq!(priced.sl, 90.0);
        assert_eq!(priced.tp, 110.0);
    }

    #[test]
    fn short_target_below_zero_is_rejected() {
        let attacher = RiskAttacher::new(RiskConfig::with_multiples(1.0, 100.0));
        let err = attacher.attach_with(signal(Side::Short), &candle(10.0), Some(1.0));
        assert!(matches!(err, Err(Error::MalformedSignal(_))));
    }

    #[test]
    fn empty_window_is_an_error() {
        assert!(RiskAttacher::default().attach(signal(Side::Long), &[]).is_err());
    }

    #[test]
    fn attach_computes_atr_from_window() {
        // 20 bars with a constant 2.0 range and no gaps -> ATR 2.0
        let candles: Vec<Candle> = (0..20)
            .map(|i| Candle {
                open_time: i * 300_000,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
                close_time: i * 300_000 + 299_999,
            })
            .collect();
        let priced = RiskAttacher::default().attach(signal(Side::Long), &candles).unwrap();
        assert!((priced.sl - 98.0).abs() < 1e-9);
        assert!((priced.tp - 104.0).abs() < 1e-9);
    }
}
