use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One fixed-interval OHLCV summary ("kline").
///
/// Times are Unix milliseconds, as delivered by Binance. A window of candles
/// is ordered ascending by `open_time` with no duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl Candle {
    pub fn close_time_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.close_time)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Close prices of a candle window, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            other => Err(Error::MalformedSignal(format!("unknown side '{other}'"))),
        }
    }
}

/// Candidate signal emitted by a strategy evaluation.
///
/// `entry`, `sl` and `tp` are optional: risk attachment fills in whatever the
/// strategy left out. `entry_time` defaults to the triggering candle's close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub strategy: String,
    pub timeframe: String,
    pub entry: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub reason: String,
    /// Unix milliseconds.
    pub entry_time: Option<i64>,
    /// Strategy-specific extras, e.g. `range_high` / `range_low`.
    #[serde(default)]
    pub meta: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        strategy: impl Into<String>,
        timeframe: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            strategy: strategy.into(),
            timeframe: timeframe.into(),
            entry: None,
            sl: None,
            tp: None,
            reason: reason.into(),
            entry_time: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, entry: f64) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn with_levels(mut self, sl: f64, tp: f64) -> Self {
        self.sl = Some(sl);
        self.tp = Some(tp);
        self
    }

    pub fn with_entry_time(mut self, ms: i64) -> Self {
        self.entry_time = Some(ms);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: f64) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Reject signals that must never reach risk attachment or a sink.
    pub fn validate(&self) -> Result<(), Error> {
        if self.symbol.trim().is_empty() {
            return Err(Error::MalformedSignal("empty symbol".into()));
        }
        for (field, value) in [("entry", self.entry), ("sl", self.sl), ("tp", self.tp)] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(Error::MalformedSignal(format!("{field} is not a positive finite price: {v}")));
                }
            }
        }
        Ok(())
    }
}

/// A signal with every field resolved, ready for dedup and the sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedSignal {
    pub symbol: String,
    pub side: Side,
    pub strategy: String,
    pub timeframe: String,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub reason: String,
    /// Unix milliseconds.
    pub entry_time: i64,
    /// True when the strategy itself chose the entry time.
    pub explicit_entry_time: bool,
    #[serde(default)]
    pub meta: BTreeMap<String, f64>,
}

impl PricedSignal {
    pub fn entry_time_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.entry_time)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Current state of the polling orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the orchestrator via its command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Pause,
    Resume,
    /// Cooperative shutdown: no new sweep is started after this is seen.
    Stop,
}
