//! Concrete strategy variants. Each one is a pure function of its window.

pub mod ema_cross;
pub mod macd_retest;
pub mod price_threshold;
pub mod range_reentry;
pub mod rsi_reversal;
pub mod trend_pullback;

pub use ema_cross::EmaCross;
pub use macd_retest::MacdRetest;
pub use price_threshold::PriceThreshold;
pub use range_reentry::RangeReentry;
pub use rsi_reversal::RsiReversal;
pub use trend_pullback::TrendPullback;
