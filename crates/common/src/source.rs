use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Candle, Result};

/// Upstream provider of kline history.
///
/// Implementations return candles ascending by open time and own their
/// retry/backoff policy; callers treat an `Err` as "skip this cycle".
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// The most recent `limit` candles, possibly including the still-forming one.
    async fn recent_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;

    /// Every candle whose open time lies in `[start, end]`, paginating as needed.
    async fn candles_between(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

/// Drop trailing candles that have not closed yet at `now_ms`.
pub fn closed_only(mut candles: Vec<Candle>, now_ms: i64) -> Vec<Candle> {
    while candles.last().is_some_and(|c| c.close_time > now_ms) {
        candles.pop();
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64, close_time: i64) -> Candle {
        Candle {
            open_time,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
            close_time,
        }
    }

    #[test]
    fn closed_only_drops_forming_candle() {
        let candles = vec![candle(0, 999), candle(1000, 1999), candle(2000, 2999)];
        let out = closed_only(candles, 2500);
        assert_eq!(out.len(), 2);
        assert_eq!(out.last().unwrap().close_time, 1999);
    }

    #[test]
    fn closed_only_keeps_fully_closed_window() {
        let candles = vec![candle(0, 999), candle(1000, 1999)];
        assert_eq!(closed_only(candles, 5000).len(), 2);
    }
}
