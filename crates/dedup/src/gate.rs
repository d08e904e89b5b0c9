use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use common::{FailurePolicy, PricedSignal};

use crate::fingerprint::fingerprint;
use crate::store::DedupStore;

/// Admits each signal fingerprint at most once per TTL window.
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn DedupStore>,
    ttl: Duration,
    policy: FailurePolicy,
}

impl DedupGate {
    pub fn new(store: Arc<dyn DedupStore>, ttl: Duration, policy: FailurePolicy) -> Self {
        Self { store, ttl, policy }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn DedupStore> {
        &self.store
    }

    /// Returns `true` when `signal` is fresh and should go downstream.
    ///
    /// A store error is resolved by the configured [`FailurePolicy`] and never
    /// surfaces to the caller.
    pub async fn admit(&self, signal: &PricedSignal) -> bool {
        self.try_acquire(&fingerprint(signal)).await
    }

    /// Set-if-absent on a raw fingerprint key.
    pub async fn try_acquire(&self, key: &str) -> bool {
        match self.store.set_if_absent(key, self.ttl).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(key, "Duplicate signal suppressed");
                false
            }
            Err(e) => {
                let admit = self.policy == FailurePolicy::Open;
                warn!(key, error = %e, fail_open = admit, "Dedup store unavailable");
                admit
            }
        }
    }
}

impl std::fmt::Debug for DedupGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupGate")
            .field("ttl", &self.ttl)
            .field("policy", &self.policy)
            .finish()
    }
}
