use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use common::{Error, PricedSignal, Result, SignalSink};

/// Delivers every signal to each inner sink; one failing sink does not stop the others.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SignalSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn SignalSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl SignalSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn deliver(&self, signal: &PricedSignal) -> Result<()> {
        let mut failed = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(signal).await {
                warn!(sink = sink.name(), symbol = %signal.symbol, error = %e, "Sink failed");
                failed.push(format!("{}: {e}", sink.name()));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Other(format!("sink failures: {}", failed.join("; "))))
        }
    }
}

/// Writes accepted signals to the log. Always present so signals are visible
/// even without persistence or notification configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl SignalSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, s: &PricedSignal) -> Result<()> {
        info!(
            symbol = %s.symbol,
            side = %s.side,
            strategy = %s.strategy,
            timeframe = %s.timeframe,
            entry = s.entry,
            sl = s.sl,
            tp = s.tp,
            entry_time = %s.entry_time_utc(),
            reason = %s.reason,
            "SIGNAL"
        );
        Ok(())
    }
}
