use std::collections::BTreeMap;

use serde::Serialize;

/// Win rate in percent, rounded to two decimals; 0 when nothing was scored.
pub fn winrate(wins: u32, trades: u32) -> f64 {
    if trades == 0 {
        return 0.0;
    }
    let pct = wins as f64 / trades as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub trades: u32,
    pub wins: u32,
    pub winrate: f64,
    /// Set when this symbol could not be backtested; it then scores zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SymbolReport {
    pub fn new(symbol: impl Into<String>, trades: u32, wins: u32) -> Self {
        Self {
            symbol: symbol.into(),
            trades,
            wins,
            winrate: winrate(wins, trades),
            error: None,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::new(symbol, 0, 0)
    }

    pub fn failed(symbol: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(symbol)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub strategy: String,
    pub interval: String,
    pub months: u32,
    pub trades: u32,
    pub wins: u32,
    pub winrate: f64,
    pub per_symbol: BTreeMap<String, SymbolReport>,
}

impl BacktestReport {
    /// Aggregate per-symbol results; totals are summed before the rate is taken.
    pub fn aggregate(
        strategy: impl Into<String>,
        interval: impl Into<String>,
        months: u32,
        per_symbol: impl IntoIterator<Item = SymbolReport>,
    ) -> Self {
        let per_symbol: BTreeMap<String, SymbolReport> =
            per_symbol.into_iter().map(|r| (r.symbol.clone(), r)).collect();
        let trades = per_symbol.values().map(|r| r.trades).sum();
        let wins = per_symbol.values().map(|r| r.wins).sum();
        Self {
            strategy: strategy.into(),
            interval: interval.into(),
            months,
            trades,
            wins,
            winrate: winrate(wins, trades),
            per_symbol,
        }
    }

    /// Plain-text summary for chat replies.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Backtest {} ({}, {}m): trades {}, wins {}, winrate {:.2}%",
            self.strategy, self.interval, self.months, self.trades, self.wins, self.winrate
        );
        for r in self.per_symbol.values() {
            match &r.error {
                Some(e) => out.push_str(&format!("\n{}: failed ({e})", r.symbol)),
                None => out.push_str(&format!(
                    "\n{}: trades {}, wins {}, winrate {:.2}%",
                    r.symbol, r.trades, r.wins, r.winrate
                )),
            }
        }
        out
    }
}
