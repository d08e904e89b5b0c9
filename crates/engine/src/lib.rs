pub mod binance;
pub mod lifecycle;
pub mod pipeline;
pub mod sink;
pub mod store;

pub use binance::{BinanceKlineSource, RetryPolicy};
pub use lifecycle::{EngineStats, Orchestrator, OrchestratorConfig, OrchestratorHandle, StatsSnapshot};
pub use pipeline::{Disposition, SignalPipeline};
pub use sink::{FanoutSink, LogSink};
pub use store::{SignalStore, StoredSignal};
