use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use common::{Candle, CandleSource, Config, Error, Result};

/// Largest page Binance USDⓈ-M futures returns for `/fapi/v1/klines`.
const MAX_LIMIT: usize = 1500;
/// Page size used when walking history backwards.
const PAGE_LIMIT: usize = 1000;
/// Upper bound on pages fetched for one history request.
const MAX_PAGES: usize = 20_000;

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(750),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Public kline endpoint of Binance futures.
///
/// Owns the retry policy: rate limiting (429/418), 5xx responses and network
/// errors are retried with backoff; anything else surfaces immediately.
pub struct BinanceKlineSource {
    base: String,
    http: Client,
    retry: RetryPolicy,
}

impl BinanceKlineSource {
    pub fn new(base: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
            retry,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.binance_base.clone(),
            cfg.request_timeout,
            RetryPolicy {
                max_attempts: cfg.retry_max,
                base_delay: cfg.retry_base_delay,
                ..RetryPolicy::default()
            },
        )
    }

    async fn klines(&self, symbol: &str, interval: &str, params: &[(&str, String)]) -> Result<Vec<Candle>> {
        let mut attempt = 1;
        loop {
            match self.klines_once(symbol, interval, params).await {
                Ok(candles) => return Ok(candles),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        symbol,
                        interval,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Kline fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn klines_once(&self, symbol: &str, interval: &str, params: &[(&str, String)]) -> Result<Vec<Candle>> {
        let url = format!("{}/fapi/v1/klines", self.base);
        let started = std::time::Instant::now();

        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", symbol), ("interval", interval)])
            .query(params)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            return Err(Error::RateLimited { status: status.as_u16() });
        }
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if status.is_server_error() {
            return Err(Error::Http(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }

        let rows: Vec<Vec<Value>> = serde_json::from_str(&body)?;
        let candles = rows.iter().map(|r| parse_row(r)).collect::<Result<Vec<_>>>()?;
        debug!(
            symbol,
            interval,
            rows = candles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Klines fetched"
        );
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BinanceKlineSource {
    async fn recent_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_LIMIT);
        self.klines(symbol, interval, &[("limit", limit.to_string())]).await
    }

    async fn candles_between(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
        paginate_backward(start_ms, end_ms, |cursor| async move {
            self.klines(
                symbol,
                interval,
                &[("limit", PAGE_LIMIT.to_string()), ("endTime", cursor.to_string())],
            )
            .await
        })
        .await
    }
}

/// Walk history backwards from `end_ms` in pages ending at a cursor, until a
/// page reaches `start_ms` or comes back empty.
///
/// The result is ascending, free of duplicate open times and restricted to
/// `[start_ms, end_ms]`.
pub async fn paginate_backward<F, Fut>(start_ms: i64, end_ms: i64, mut fetch: F) -> Result<Vec<Candle>>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<Vec<Candle>>>,
{
    let mut out: Vec<Candle> = Vec::new();
    let mut cursor = end_ms;
    let mut pages = 0;

    while cursor > start_ms && pages < MAX_PAGES {
        let batch = fetch(cursor).await?;
        let Some(first_open) = batch.first().map(|c| c.open_time) else {
            break;
        };
        out.splice(0..0, batch);
        pages += 1;
        if first_open <= start_ms || first_open > cursor {
            break;
        }
        cursor = first_open - 1;
    }

    out.retain(|c| c.open_time >= start_ms && c.open_time <= end_ms);
    out.sort_by_key(|c| c.open_time);
    out.dedup_by_key(|c| c.open_time);
    Ok(out)
}

/// Parse one kline row `[openTime, open, high, low, close, volume, closeTime, ...]`.
/// Prices may arrive as numbers or numeric strings.
fn parse_row(row: &[Value]) -> Result<Candle> {
    if row.len() < 7 {
        return Err(Error::Exchange(format!("kline row has {} fields, expected >= 7", row.len())));
    }
    Ok(Candle {
        open_time: int_field(&row[0], "open_time")?,
        open: num_field(&row[1], "open")?,
        high: num_field(&row[2], "high")?,
        low: num_field(&row[3], "low")?,
        close: num_field(&row[4], "close")?,
        volume: num_field(&row[5], "volume")?,
        close_time: int_field(&row[6], "close_time")?,
    })
}

fn num_field(v: &Value, name: &str) -> Result<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|x| x.is_finite())
        .ok_or_else(|| Error::Exchange(format!("kline field '{name}' is not numeric: {v}")))
}

fn int_field(v: &Value, name: &str) -> Result<i64> {
    let parsed = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::Exchange(format!("kline field '{name}' is not an integer: {v}")))
}
