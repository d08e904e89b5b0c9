use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use common::{PricedSignal, Result, Side, SignalSink};

/// A persisted signal as returned to the API.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredSignal {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub strategy: String,
    pub timeframe: String,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub reason: String,
    pub entry_time: i64,
    pub created_at: String,
}

/// SQLite persistence for accepted signals.
#[derive(Debug, Clone)]
pub struct SignalStore {
    db: SqlitePool,
}

impl SignalStore {
    /// Connect and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        let store = Self::from_pool(db).await?;
        info!("Signal store ready");
        Ok(store)
    }

    pub async fn from_pool(db: SqlitePool) -> Result<Self> {
        sqlx::migrate!("../../migrations")
            .run(&db)
            .await
            .map_err(|e| common::Error::Database(e.into()))?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn insert(&self, signal: &PricedSignal) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let meta = serde_json::to_string(&signal.meta)?;
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO signals
                (id, fingerprint, symbol, side, strategy, timeframe, entry, sl, tp, reason, entry_time, meta, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&id)
        .bind(dedup::fingerprint(signal))
        .bind(&signal.symbol)
        .bind(signal.side)
        .bind(&signal.strategy)
        .bind(&signal.timeframe)
        .bind(signal.entry)
        .bind(signal.sl)
        .bind(signal.tp)
        .bind(&signal.reason)
        .bind(signal.entry_time)
        .bind(meta)
        .bind(created_at)
        .execute(&self.db)
        .await?;

        Ok(id)
    }

    /// Most recent signals first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<StoredSignal>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            r#"
            SELECT id, symbol, side, strategy, timeframe, entry, sl, tp, reason, entry_time, created_at
            FROM signals
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signals").fetch_one(&self.db).await?;
        Ok(n)
    }
}

#[async_trait]
impl SignalSink for SignalStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn deliver(&self, signal: &PricedSignal) -> Result<()> {
        self.insert(signal).await.map(|_| ())
    }
}
