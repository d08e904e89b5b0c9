pub mod config;
pub mod error;
pub mod sink;
pub mod source;
pub mod types;

pub use config::{Config, FailurePolicy, LogFormat};
pub use error::{Error, Result};
pub use sink::SignalSink;
pub use source::{closed_only, CandleSource};
pub use types::*;
