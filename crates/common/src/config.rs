use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Behaviour of the dedup gate when its store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Treat the signal as already seen and drop it.
    #[default]
    Closed,
    /// Treat the signal as fresh and let it through.
    Open,
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "closed" | "fail-closed" => Ok(FailurePolicy::Closed),
            "open" | "fail-open" => Ok(FailurePolicy::Open),
            other => Err(Error::Config(format!(
                "DEDUP_FAILURE_POLICY must be 'closed' or 'open', got: '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("LOG_FORMAT must be 'text' or 'json', got: '{other}'"))),
        }
    }
}

/// All process configuration, read from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Market data
    pub pairs: Vec<String>,
    pub binance_base: String,
    pub request_timeout: Duration,
    pub retry_max: u32,
    pub retry_base_delay: Duration,

    // Risk attachment
    pub atr_sl_mult: f64,
    pub atr_tp_mult: f64,

    // Dedup gate
    pub dedup_ttl: Duration,
    pub dedup_failure_policy: FailurePolicy,
    pub redis_url: Option<String>,

    // Orchestrator
    pub poll_interval: Duration,
    pub window_limit: usize,
    pub warmup_limit: usize,

    // Backtest
    pub backtest_months: u32,

    // Persistence
    pub database_url: String,

    // Telegram
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub telegram_allowed_user_ids: Vec<i64>,

    // Dashboard
    pub dashboard_token: Option<String>,
    pub dashboard_port: u16,

    pub strategy_config_path: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let pairs: Vec<String> = get("PAIRS")
            .unwrap_or_else(|| "BTCUSDT,ETHUSDT,SOLUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if pairs.is_empty() {
            return Err(Error::Config("PAIRS must name at least one symbol".into()));
        }

        let telegram_allowed_user_ids = match get("TELEGRAM_ALLOWED_USER_IDS") {
            Some(raw) => raw
                .split(',')
                .map(|s| {
                    s.trim().parse::<i64>().map_err(|_| {
                        Error::Config(format!(
                            "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{}'",
                            s.trim()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let atr_sl_mult: f64 = parse_or(&get, "ATR_SL_MULT", 1.0)?;
        let atr_tp_mult: f64 = parse_or(&get, "ATR_TP_MULT", 2.0)?;
        if atr_sl_mult <= 0.0 || atr_tp_mult <= 0.0 {
            return Err(Error::Config("ATR_SL_MULT and ATR_TP_MULT must be positive".into()));
        }

        let dedup_ttl_secs: u64 = parse_or(&get, "DEDUP_TTL_SECS", 60 * 60 * 24)?;
        if dedup_ttl_secs == 0 {
            return Err(Error::Config("DEDUP_TTL_SECS must be greater than zero".into()));
        }

        let poll_interval_secs: f64 = parse_or(&get, "POLL_INTERVAL_SECS", 1.0)?;
        if !(poll_interval_secs > 0.0) {
            return Err(Error::Config("POLL_INTERVAL_SECS must be positive".into()));
        }

        let request_timeout_secs: f64 = parse_or(&get, "REQUEST_TIMEOUT_SECS", 10.0)?;
        if !(request_timeout_secs > 0.0) {
            return Err(Error::Config("REQUEST_TIMEOUT_SECS must be positive".into()));
        }

        Ok(Config {
            pairs,
            binance_base: get("BINANCE_BASE")
                .unwrap_or_else(|| "https://fapi.binance.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            request_timeout: Duration::from_secs_f64(request_timeout_secs),
            retry_max: parse_or::<u32, _>(&get, "RETRY_MAX", 5)?.max(1),
            retry_base_delay: Duration::from_millis(parse_or(&get, "RETRY_BASE_DELAY_MS", 750)?),
            atr_sl_mult,
            atr_tp_mult,
            dedup_ttl: Duration::from_secs(dedup_ttl_secs),
            dedup_failure_policy: get("DEDUP_FAILURE_POLICY")
                .map(|v| v.parse::<FailurePolicy>())
                .transpose()?
                .unwrap_or_default(),
            redis_url: get("REDIS_URL"),
            poll_interval: Duration::from_secs_f64(poll_interval_secs),
            window_limit: parse_or(&get, "WINDOW_LIMIT", 300)?,
            warmup_limit: parse_or(&get, "WARMUP_LIMIT", 200)?,
            backtest_months: parse_or(&get, "BACKTEST_MONTHS", 3)?,
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://signals.db?mode=rwc".to_string()),
            telegram_token: get("TELEGRAM_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID")
                .map(|v| {
                    v.parse::<i64>()
                        .map_err(|_| Error::Config(format!("TELEGRAM_CHAT_ID is not numeric: '{v}'")))
                })
                .transpose()?,
            telegram_allowed_user_ids,
            dashboard_token: get("DASHBOARD_TOKEN"),
            dashboard_port: parse_or(&get, "DASHBOARD_PORT", 8080)?,
            strategy_config_path: get("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            log_format: get("LOG_FORMAT")
                .map(|v| v.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}
