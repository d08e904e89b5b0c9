use async_trait::async_trait;

use crate::{PricedSignal, Result};

/// Downstream consumer of accepted signals (persistence, notification).
///
/// Only signals that passed risk attachment and the dedup gate are delivered.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn deliver(&self, signal: &PricedSignal) -> Result<()>;
}
