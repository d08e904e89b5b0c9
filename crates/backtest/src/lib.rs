//! Historical replay of strategies with forward-scanned TP/SL outcomes.

pub mod replay;
pub mod report;
pub mod runner;

pub use replay::{replay, resolve, Outcome, ReplayConfig, SignalSelection};
pub use report::{winrate, BacktestReport, SymbolReport};
pub use runner::Backtester;
