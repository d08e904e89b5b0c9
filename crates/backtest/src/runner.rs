use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use common::{closed_only, CandleSource, Error, Result};
use strategy::RegisteredStrategy;

use crate::replay::{replay, ReplayConfig};
use crate::report::{BacktestReport, SymbolReport};

/// Days per "month" when turning a lookback into a start time.
const DAYS_PER_MONTH: i64 = 30;

/// Replays one strategy over fetched history for a list of symbols.
///
/// Each run owns its one-shot state, so runs never affect live evaluation or
/// each other.
#[derive(Clone)]
pub struct Backtester {
    source: Arc<dyn CandleSource>,
    cfg: ReplayConfig,
}

impl Backtester {
    pub fn new(source: Arc<dyn CandleSource>) -> Self {
        Self::with_config(source, ReplayConfig::default())
    }

    pub fn with_config(source: Arc<dyn CandleSource>, cfg: ReplayConfig) -> Self {
        Self { source, cfg }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.cfg
    }

    /// Backtest `entry` over the last `months` months, ending now.
    pub async fn run(&self, entry: &RegisteredStrategy, symbols: &[String], months: u32) -> BacktestReport {
        self.run_until(entry, symbols, months, Utc::now()).await
    }

    /// Backtest ending at `end`. A symbol that fails to fetch or replay is
    /// logged and scores zero; the rest of the run continues.
    pub async fn run_until(
        &self,
        entry: &RegisteredStrategy,
        symbols: &[String],
        months: u32,
        end: DateTime<Utc>,
    ) -> BacktestReport {
        let start = end - Duration::days(DAYS_PER_MONTH * i64::from(months));
        let interval = entry.strategy.timeframe().to_string();
        let mut results = Vec::with_capacity(symbols.len());

        for symbol in symbols.iter().filter(|s| entry.applies_to(s)) {
            let report = match self.symbol(entry, symbol, &interval, start, end).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(strategy = %entry.name(), symbol = %symbol, error = %e, "Backtest failed for symbol");
                    SymbolReport::failed(symbol.as_str(), e.to_string())
                }
            };
            info!(
                strategy = %entry.name(),
                symbol = %symbol,
                trades = report.trades,
                wins = report.wins,
                winrate = report.winrate,
                "Backtest symbol done"
            );
            results.push(report);
        }

        let report = BacktestReport::aggregate(entry.name(), interval, months, results);
        info!(
            strategy = %report.strategy,
            trades = report.trades,
            wins = report.wins,
            winrate = report.winrate,
            "Backtest complete"
        );
        report
    }

    async fn symbol(
        &self,
        entry: &RegisteredStrategy,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SymbolReport> {
        let candles = self.source.candles_between(symbol, interval, start, end).await?;
        let candles = closed_only(candles, end.timestamp_millis());
        info!(strategy = %entry.name(), symbol, candles = candles.len(), "Backtest history loaded");

        // Replay is CPU-bound; keep it off the async workers.
        let strategy = Arc::clone(&entry.strategy);
        let (cfg, fire_once, symbol) = (self.cfg, entry.fire_once, symbol.to_string());
        tokio::task::spawn_blocking(move || replay(strategy.as_ref(), &candles, &symbol, &cfg, fire_once))
            .await
            .map_err(|e| Error::Other(format!("replay task failed: {e}")))
    }
}
