//! Stop-loss / take-profit attachment for candidate signals.

pub mod attach;

pub use attach::{static_levels, RiskAttacher, RiskConfig};
