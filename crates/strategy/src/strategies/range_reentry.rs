use chrono::{NaiveDate, TimeZone, Timelike};
use chrono_tz::Tz;

use common::{Candle, Side, Signal};

use crate::Strategy;

/// False-breakout reentry around an early-session range.
///
/// The range is the high/low of candles whose local close time falls on the
/// same local date as the last candle, between `session_start_hour` and
/// `session_end_hour`. Evaluation starts once the last candle closes after
/// the session ends.
pub struct RangeReentry {
    name: String,
    timeframe: String,
    tz: Tz,
    session_start_hour: u32,
    session_end_hour: u32,
    reward_ratio: f64,
    min_candles: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    high: f64,
    low: f64,
}

impl RangeReentry {
    pub fn new(name: impl Into<String>, timeframe: impl Into<String>, tz: Tz) -> Self {
        Self {
            name: name.into(),
            timeframe: timeframe.into(),
            tz,
            session_start_hour: 0,
            session_end_hour: 4,
            reward_ratio: 2.0,
            min_candles: 50,
        }
    }

    /// Local hours, `start_hour < end_hour <= 23`. An end of 24 would leave no
    /// bar after the session on the same day.
    pub fn with_session(mut self, start_hour: u32, end_hour: u32) -> Self {
        self.session_start_hour = start_hour;
        self.session_end_hour = end_hour;
        self
    }

    pub fn with_reward_ratio(mut self, ratio: f64) -> Self {
        self.reward_ratio = ratio;
        self
    }

    pub fn with_min_candles(mut self, n: usize) -> Self {
        self.min_candles = n.max(2);
        self
    }

    fn local(&self, ms: i64) -> Option<(NaiveDate, u32)> {
        let local = self.tz.timestamp_millis_opt(ms).single()?;
        Some((local.date_naive(), local.hour()))
    }

    fn session_range(&self, candles: &[Candle], day: NaiveDate) -> Option<Range> {
        candles
            .iter()
            .filter(|c| match self.local(c.close_time) {
                Some((d, h)) => d == day && h >= self.session_start_hour && h < self.session_end_hour,
                None => false,
            })
            .fold(None, |acc: Option<Range>, c| {
                Some(match acc {
                    None => Range { high: c.high, low: c.low },
                    Some(r) => Range {
                        high: r.high.max(c.high),
                        low: r.low.min(c.low),
                    },
                })
            })
    }
}

impl Strategy for RangeReentry {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> &str {
        &self.timeframe
    }

    fn min_candles(&self) -> usize {
        self.min_candles
    }

    fn evaluate(&self, candles: &[Candle], symbol: &str) -> Vec<Signal> {
        if candles.len() < self.min_candles {
            return Vec::new();
        }
        let [.., prev, curr] = candles else {
            return Vec::new();
        };
        let Some((day, hour)) = self.local(curr.close_time) else {
            return Vec::new();
        };
        // Range is still forming.
        if hour < self.session_end_hour {
            return Vec::new();
        }
        let Some(range) = self.session_range(candles, day) else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if prev.close > range.high && curr.close <= range.high {
            let entry = curr.close;
            let sl = prev.high;
            let tp = entry - self.reward_ratio * (sl - entry).abs();
            out.push(self.signal(
                symbol,
                Side::Short,
                format!("Range reentry SHORT: breakout above {:.4}, closed back inside", range.high),
                entry,
                sl,
                tp,
                curr.close_time,
                range,
            ));
        }

        if prev.close < range.low && curr.close >= range.low {
            let entry = curr.close;
            let sl = prev.low;
            let tp = entry + self.reward_ratio * (entry - sl).abs();
            out.push(self.signal(
                symbol,
                Side::Long,
                format!("Range reentry LONG: breakout below {:.4}, closed back inside", range.low),
                entry,
                sl,
                tp,
                curr.close_time,
                range,
            ));
        }

        out
    }
}

impl RangeReentry {
    #[allow(clippy::too_many_arguments)]
    fn signal(
        &self,
        symbol: &str,
        side: Side,
        reason: String,
        entry: f64,
        sl: f64,
        tp: f64,
        entry_time: i64,
        range: Range,
    ) -> Signal {
        Signal::new(symbol, side, &self.name, &self.timeframe, reason)
            .with_entry(entry)
            .with_levels(sl, tp)
            .with_entry_time(entry_time)
            .with_meta("range_high", range.high)
            .with_meta("range_low", range.low)
    }
}
