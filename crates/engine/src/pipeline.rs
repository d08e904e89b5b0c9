use std::sync::Arc;

use tracing::{error, info, warn};

use common::{Candle, PricedSignal, Signal, SignalSink};
use dedup::DedupGate;
use risk::RiskAttacher;

/// What happened to one candidate signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Passed every stage and was handed to the sink.
    Accepted(PricedSignal),
    /// Fingerprint already seen within the TTL (or the store failed closed).
    Duplicate,
    /// Malformed before or after risk attachment.
    Rejected(String),
}

/// Risk attachment -> dedup gate -> sink, for one candidate at a time.
#[derive(Clone)]
pub struct SignalPipeline {
    attacher: RiskAttacher,
    gate: DedupGate,
    sink: Arc<dyn SignalSink>,
}

impl SignalPipeline {
    pub fn new(attacher: RiskAttacher, gate: DedupGate, sink: Arc<dyn SignalSink>) -> Self {
        Self { attacher, gate, sink }
    }

    pub fn gate(&self) -> &DedupGate {
        &self.gate
    }

    /// Process one candidate evaluated on `window`.
    ///
    /// A sink failure is logged but does not undo acceptance: the fingerprint
    /// is already taken, so retrying would only duplicate the announcement.
    pub async fn process(&self, signal: Signal, window: &[Candle]) -> Disposition {
        let (symbol, strategy) = (signal.symbol.clone(), signal.strategy.clone());

        let priced = match self.attacher.attach(signal, window) {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol = %symbol, strategy = %strategy, error = %e, "Signal dropped");
                return Disposition::Rejected(e.to_string());
            }
        };

        if !self.gate.admit(&priced).await {
            return Disposition::Duplicate;
        }

        info!(
            symbol = %priced.symbol,
            strategy = %priced.strategy,
            side = %priced.side,
            entry = priced.entry,
            sl = priced.sl,
            tp = priced.tp,
            "Signal accepted"
        );
        if let Err(e) = self.sink.deliver(&priced).await {
            error!(symbol = %priced.symbol, strategy = %priced.strategy, sink = self.sink.name(), error = %e, "Sink delivery failed");
        }
        Disposition::Accepted(priced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{FailurePolicy, Result, Side};
    use dedup::MemoryDedupStore;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<PricedSignal>>);

    #[async_trait]
    impl SignalSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }
        async fn deliver(&self, signal: &PricedSignal) -> Result<()> {
            self.0.lock().await.push(signal.clone());
            Ok(())
        }
    }

    fn window() -> Vec<Candle> {
        vec![Candle {
            open_time: 0,
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 1.0,
            close_time: 299_999,
        }]
    }

    fn pipeline(sink: Arc<Collect>) -> SignalPipeline {
        let gate = DedupGate::new(Arc::new(MemoryDedupStore::new()), Duration::from_secs(60), FailurePolicy::Closed);
        SignalPipeline::new(RiskAttacher::default(), gate, sink)
    }

    #[tokio::test]
    async fn accepts_then_suppresses_duplicate() {
        let sink = Arc::new(Collect::default());
        let p = pipeline(sink.clone());
        let sig = Signal::new("BTCUSDT", Side::Long, "s", "5m", "EMA9>EMA21");

        assert!(matches!(p.process(sig.clone(), &window()).await, Disposition::Accepted(_)));
        assert_eq!(p.process(sig, &window()).await, Disposition::Duplicate);

        let delivered = sink.0.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entry, 100.0);
        assert_eq!(delivered[0].entry_time, 299_999);
    }

    #[tokio::test]
    async fn malformed_signal_never_reaches_sink() {
        let sink = Arc::new(Collect::default());
        let p = pipeline(sink.clone());
        let sig = Signal::new("BTCUSDT", Side::Long, "s", "5m", "r").with_entry(f64::NAN);
        assert!(matches!(p.process(sig, &window()).await, Disposition::Rejected(_)));
        assert!(sink.0.lock().await.is_empty());
    }
}
