use std::collections::HashSet;

/// Tracks which (strategy, symbol) pairs have already fired a one-shot signal.
///
/// Owned by whoever drives evaluation (the live orchestrator or a single
/// backtest run), so a fresh process or replay starts with nothing fired.
#[derive(Debug, Default, Clone)]
pub struct OneShotLedger {
    fired: HashSet<(String, String)>,
}

impl OneShotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fired(&self, strategy: &str, symbol: &str) -> bool {
        self.fired.contains(&(strategy.to_string(), symbol.to_string()))
    }

    /// Record a firing. Returns `false` if the pair had already fired.
    pub fn mark_fired(&mut self, strategy: &str, symbol: &str) -> bool {
        self.fired.insert((strategy.to_string(), symbol.to_string()))
    }

    pub fn reset(&mut self) {
        self.fired.clear();
    }
}
