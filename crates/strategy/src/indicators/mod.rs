//! Pure indicator functions over candle windows.
//!
//! Every function returns one output per input position; positions where the
//! indicator is not yet defined are `None`.

pub mod atr;
pub mod ema;
pub mod macd;
pub mod rsi;

pub use atr::{atr, true_range};
pub use ema::ema;
pub use macd::{macd, Macd};
pub use rsi::rsi;

/// The last two values of a series, `(previous, current)`, when both are defined.
pub fn last_two(series: &[Option<f64>]) -> Option<(f64, f64)> {
    match series {
        [.., Some(prev), Some(curr)] => Some((*prev, *curr)),
        _ => None,
    }
}

/// The last value of a series, when defined.
pub fn last(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}
