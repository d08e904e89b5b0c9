use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use common::{Error, Result};

/// Shared key-value store offering an atomic set-if-absent with expiry.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomically create `key` with the given TTL. Returns `true` when the key
    /// was absent (this caller won), `false` when it already existed.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> Result<()>;
}

/// In-process store used when no shared store is configured, and in tests.
///
/// Expiry uses `tokio::time::Instant` so paused-clock tests can advance it.
#[derive(Debug, Default)]
pub struct MemoryDedupStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().await.values().filter(|&&exp| exp > now).count()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, exp| *exp > now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Redis-backed store: `SET key 1 NX EX ttl`.
#[derive(Clone)]
pub struct RedisDedupStore {
    conn: ConnectionManager,
}

impl RedisDedupStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let conn = ConnectionManager::new(client).await.map_err(store_err)?;
        info!("Connected to Redis dedup store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        // "OK" when set, nil when the key already existed.
        Ok(reply.is_some())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(store_err)?;
        Ok(())
    }
}

fn store_err(e: redis::RedisError) -> Error {
    Error::Store(e.to_string())
}
