use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Candle, Side};
use risk::static_levels;
use strategy::{OneShotLedger, Strategy};

use crate::report::SymbolReport;

/// Which of a bar's emitted signals become simulated trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSelection {
    /// Only the first signal per bar (historical behaviour).
    #[default]
    FirstOnly,
    /// Every signal the strategy emits on the bar.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayConfig {
    /// First window end index evaluated.
    pub warmup: usize,
    /// Shorter series score zero trades.
    pub min_candles: usize,
    pub selection: SignalSelection,
    /// Default stop when the strategy supplies none (0.005 = 0.5%).
    pub sl_pct: f64,
    /// Default target when the strategy supplies none (0.01 = 1%).
    pub tp_pct: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            warmup: 100,
            min_candles: 200,
            selection: SignalSelection::FirstOnly,
            sl_pct: 0.005,
            tp_pct: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

/// Scan `subsequent` candles for the first touch of `tp` or `sl`.
///
/// A candle touching both is a loss, since the intrabar order is unknown.
/// `None` means the trade was still open when the series ended.
pub fn resolve(side: Side, tp: f64, sl: f64, subsequent: &[Candle]) -> Option<Outcome> {
    for c in subsequent {
        let (tp_hit, sl_hit) = match side {
            Side::Long => (c.high >= tp, c.low <= sl),
            Side::Short => (c.low <= tp, c.high >= sl),
        };
        if sl_hit {
            return Some(Outcome::Loss);
        }
        if tp_hit {
            return Some(Outcome::Win);
        }
    }
    None
}

/// Walk `candles` forward, evaluating `strategy` on every prefix exactly as
/// live polling would, and score each taken signal.
///
/// With `fire_once`, only the first taken signal of the run is scored.
pub fn replay(
    strategy: &dyn Strategy,
    candles: &[Candle],
    symbol: &str,
    cfg: &ReplayConfig,
    fire_once: bool,
) -> SymbolReport {
    if candles.len() < cfg.min_candles.max(2) {
        debug!(symbol, have = candles.len(), need = cfg.min_candles, "Series too short to backtest");
        return SymbolReport::empty(symbol);
    }

    let mut ledger = OneShotLedger::new();
    let (mut trades, mut wins) = (0u32, 0u32);

    for i in cfg.warmup..candles.len() - 1 {
        let window = &candles[..=i];
        let close = candles[i].close;

        let mut signals = strategy.evaluate(window, symbol);
        if cfg.selection == SignalSelection::FirstOnly {
            signals.truncate(1);
        }

        for sig in signals {
            if let Err(e) = sig.validate() {
                debug!(symbol, strategy = %strategy.name(), error = %e, "Dropping malformed signal");
                continue;
            }
            if fire_once && !ledger.mark_fired(strategy.name(), symbol) {
                continue;
            }
            let entry = sig.entry.unwrap_or(close);
            let (default_sl, default_tp) = static_levels(sig.side, entry, cfg.sl_pct, cfg.tp_pct);
            let sl = sig.sl.unwrap_or(default_sl);
            let tp = sig.tp.unwrap_or(default_tp);

            match resolve(sig.side, tp, sl, &candles[i + 1..]) {
                Some(Outcome::Win) => {
                    trades += 1;
                    wins += 1;
                }
                Some(Outcome::Loss) => trades += 1,
                None => {}
            }
        }
    }

    SymbolReport::new(symbol, trades, wins)
}
