pub mod config;
pub mod indicators;
pub mod oneshot;
pub mod registry;
pub mod strategies;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use oneshot::OneShotLedger;
pub use registry::{RegisteredStrategy, StrategyRegistry};

use common::{Candle, Signal};

/// All strategy implementations must satisfy this trait.
///
/// Strategies are stateless: the same window always yields the same signals.
/// Any "fire once" policy is tracked by the caller through [`OneShotLedger`].
pub trait Strategy: Send + Sync {
    /// Unique name of this strategy instance.
    fn name(&self) -> &str;

    /// Candle interval this strategy consumes, e.g. "5m".
    fn timeframe(&self) -> &str;

    /// Shortest window on which `evaluate` can produce a signal.
    fn min_candles(&self) -> usize;

    /// Evaluate a window of closed candles (oldest first) for one symbol.
    ///
    /// Returns an empty list when the window is too short or an indicator is
    /// undefined; never panics on well-typed input.
    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal>;
}
