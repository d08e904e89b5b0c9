use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use common::{Error, Result};

use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::strategies::{EmaCross, MacdRetest, PriceThreshold, RangeReentry, RsiReversal, TrendPullback};
use crate::Strategy;

/// A built strategy plus the scheduling options from its config entry.
#[derive(Clone)]
pub struct RegisteredStrategy {
    pub strategy: Arc<dyn Strategy>,
    pub fire_once: bool,
    /// Empty means every configured pair.
    pub symbols: Vec<String>,
}

impl RegisteredStrategy {
    pub fn new(strategy: Arc<dyn Strategy>) -> Self {
        Self {
            strategy,
            fire_once: false,
            symbols: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.strategy.name()
    }

    pub fn applies_to(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }
}

impl std::fmt::Debug for RegisteredStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredStrategy")
            .field("name", &self.strategy.name())
            .field("timeframe", &self.strategy.timeframe())
            .field("fire_once", &self.fire_once)
            .field("symbols", &self.symbols)
            .finish()
    }
}

/// Static name -> strategy mapping, built once at startup from the strategy file.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: Vec<RegisteredStrategy>,
}

impl StrategyRegistry {
    /// Build the registry from config. Disabled entries are skipped; unknown
    /// types, bad parameters and duplicate names are config errors.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut registry = Self::default();

        for cfg in &file_cfg.strategies {
            if !cfg.enabled {
                info!(name = %cfg.name, "Strategy disabled, skipping");
                continue;
            }
            let strategy = build_strategy(cfg)?;
            info!(
                name = %strategy.name(),
                timeframe = %strategy.timeframe(),
                fire_once = cfg.fire_once,
                "Registered strategy"
            );
            registry.register(RegisteredStrategy {
                strategy,
                fire_once: cfg.fire_once,
                symbols: cfg.symbols.iter().map(|s| s.trim().to_uppercase()).collect(),
            })?;
        }

        Ok(registry)
    }

    pub fn register(&mut self, entry: RegisteredStrategy) -> Result<()> {
        if self.get(entry.name()).is_some() {
            return Err(Error::Config(format!("duplicate strategy name '{}'", entry.name())));
        }
        self.strategies.push(entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredStrategy> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredStrategy> {
        self.strategies.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

fn build_strategy(cfg: &StrategyConfig) -> Result<Arc<dyn Strategy>> {
    let p = &cfg.params;
    let strategy: Arc<dyn Strategy> = match cfg.strategy_type.as_str() {
        "price_threshold" => {
            let threshold = param_f64(p, "threshold", f64::NAN)?;
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(bad_param(cfg, "threshold", "must be a positive price"));
            }
            let band = param_f64(p, "band_pct", 0.02)?;
            if !(0.0..1.0).contains(&band) || band == 0.0 {
                return Err(bad_param(cfg, "band_pct", "must be in (0, 1)"));
            }
            Arc::new(PriceThreshold::new(&cfg.name, &cfg.timeframe, threshold, band))
        }
        "ema_cross" => {
            let (fast, slow) = (param_usize(p, "fast", 9)?, param_usize(p, "slow", 21)?);
            if fast == 0 || fast >= slow {
                return Err(bad_param(cfg, "fast", "must be non-zero and below 'slow'"));
            }
            Arc::new(EmaCross::new(&cfg.name, &cfg.timeframe, fast, slow))
        }
        "trend_pullback" => {
            let (fast, slow) = (param_usize(p, "fast", 50)?, param_usize(p, "slow", 200)?);
            if fast == 0 || fast >= slow {
                return Err(bad_param(cfg, "fast", "must be non-zero and below 'slow'"));
            }
            Arc::new(TrendPullback::new(&cfg.name, &cfg.timeframe, fast, slow))
        }
        "range_reentry" => {
            let tz_name = param_str(p, "timezone", "America/New_York")?;
            let tz: chrono_tz::Tz = tz_name
                .parse()
                .map_err(|_| bad_param(cfg, "timezone", "unknown IANA timezone"))?;
            let start = param_hour(cfg, "session_start_hour", 0)?;
            let end = param_hour(cfg, "session_end_hour", 4)?;
            // The session must end on the same local day for evaluation to begin.
            if start >= end {
                return Err(bad_param(cfg, "session_end_hour", "session must satisfy start < end <= 23"));
            }
            Arc::new(
                RangeReentry::new(&cfg.name, &cfg.timeframe, tz)
                    .with_session(start, end)
                    .with_reward_ratio(param_f64(p, "reward_ratio", 2.0)?)
                    .with_min_candles(param_usize(p, "min_candles", 50)?),
            )
        }
        "rsi_reversal" => {
            let period = param_usize(p, "period", 14)?;
            let overbought = param_f64(p, "overbought", 70.0)?;
            let oversold = param_f64(p, "oversold", 30.0)?;
            if period == 0 || oversold >= overbought {
                return Err(bad_param(cfg, "period", "needs period > 0 and oversold < overbought"));
            }
            Arc::new(RsiReversal::new(&cfg.name, &cfg.timeframe, period, overbought, oversold))
        }
        "macd_retest" => {
            let (fast, slow, signal) = (
                param_usize(p, "fast", 12)?,
                param_usize(p, "slow", 26)?,
                param_usize(p, "signal", 9)?,
            );
            if fast == 0 || fast >= slow || signal == 0 {
                return Err(bad_param(cfg, "fast", "needs 0 < fast < slow and signal > 0"));
            }
            let (atr_min, atr_max) = (param_f64(p, "atr_pct_min", 0.0015)?, param_f64(p, "atr_pct_max", 0.03)?);
            if !(0.0..atr_max).contains(&atr_min) {
                return Err(bad_param(cfg, "atr_pct_min", "must be >= 0 and below 'atr_pct_max'"));
            }
            let (sl_mult, tp_mult) = (param_f64(p, "sl_mult", 1.0)?, param_f64(p, "tp_mult", 1.5)?);
            if sl_mult <= 0.0 || tp_mult <= 0.0 {
                return Err(bad_param(cfg, "sl_mult", "multipliers must be positive"));
            }
            Arc::new(
                MacdRetest::new(&cfg.name, &cfg.timeframe)
                    .with_macd(fast, slow, signal)
                    .with_retest_period(param_usize(p, "retest_period", 20)?)
                    .with_bias_period(param_usize(p, "bias_period", 200)?)
                    .with_atr_band(param_usize(p, "atr_window", 14)?, atr_min, atr_max)
                    .with_multipliers(sl_mult, tp_mult),
            )
        }
        other => {
            return Err(Error::Config(format!(
                "strategy '{}': unknown type '{other}'",
                cfg.name
            )))
        }
    };
    Ok(strategy)
}

fn bad_param(cfg: &StrategyConfig, key: &str, msg: &str) -> Error {
    Error::Config(format!("strategy '{}': param '{key}' {msg}", cfg.name))
}

fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Float(f)) => Ok(*f),
        Some(toml::Value::Integer(i)) => Ok(*i as f64),
        Some(other) => Err(Error::Config(format!("param '{key}' must be a number, got {other}"))),
    }
}

fn param_usize(params: &HashMap<String, toml::Value>, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::Integer(i)) if *i >= 0 => Ok(*i as usize),
        Some(other) => Err(Error::Config(format!(
            "param '{key}' must be a non-negative integer, got {other}"
        ))),
    }
}

/// Local clock hour in `0..=23`.
fn param_hour(cfg: &StrategyConfig, key: &str, default: u32) -> Result<u32> {
    let raw = param_usize(&cfg.params, key, default as usize)?;
    u32::try_from(raw)
        .ok()
        .filter(|h| *h < 24)
        .ok_or_else(|| bad_param(cfg, key, "must be an hour in 0..=23"))
}

fn param_str<'a>(params: &'a HashMap<String, toml::Value>, key: &str, default: &'a str) -> Result<&'a str> {
    match params.get(key) {
        None => Ok(default),
        Some(toml::Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(Error::Config(format!("param '{key}' must be a string, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_registers_enabled_strategies() {
        let registry = StrategyRegistry::from_config(&StrategyFileConfig::builtin()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "scalp_ema_cross_5m",
                "trend_pullback_5m",
                "four_hour_reentry_5m",
                "rsi_reversal_5m",
                "macd_retest_5m"
            ]
        );
        assert!(registry.get("btc_price_gt_threshold").is_none());
    }

    #[test]
    fn integer_params_are_accepted_as_floats() {
        let cfg = StrategyFileConfig::parse(
            r#"
            [[strategy]]
            type = "price_threshold"
            name = "btc"
            fire_once = true
            symbols = ["btcusdt"]
            [strategy.params]
            threshold = 65000
            "#,
        )
        .unwrap();
        let registry = StrategyRegistry::from_config(&cfg).unwrap();
        let entry = registry.get("btc").unwrap();
        assert!(entry.fire_once);
        assert!(entry.applies_to("BTCUSDT"));
        assert!(!entry.applies_to("ETHUSDT"));
    }

    fn range_reentry(params: &str) -> Result<StrategyRegistry> {
        let cfg = StrategyFileConfig::parse(&format!(
            "[[strategy]]\ntype = \"range_reentry\"\nname = \"r\"\n[strategy.params]\n{params}"
        ))
        .unwrap();
        StrategyRegistry::from_config(&cfg)
    }

    #[test]
    fn session_hours_must_fall_within_one_day() {
        assert!(range_reentry("session_start_hour = 0\nsession_end_hour = 23").is_ok());
        assert!(matches!(
            range_reentry("session_start_hour = 20\nsession_end_hour = 24"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            range_reentry("session_start_hour = 4\nsession_end_hour = 4"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn oversized_hour_is_rejected_not_truncated() {
        // 2^32 + 2 would wrap to hour 2 under a plain cast.
        let err = range_reentry("session_start_hour = 0\nsession_end_hour = 4294967298").unwrap_err();
        assert!(err.to_string().contains("session_end_hour"));
    }

    #[test]
    fn macd_retest_params_are_validated() {
        let build = |params: &str| {
            let cfg = StrategyFileConfig::parse(&format!(
                "[[strategy]]\ntype = \"macd_retest\"\nname = \"m\"\n[strategy.params]\n{params}"
            ))
            .unwrap();
            StrategyRegistry::from_config(&cfg)
        };
        let registry = build("bias_period = 100").unwrap();
        assert_eq!(registry.get("m").unwrap().strategy.min_candles(), 101);
        assert!(build("fast = 26\nslow = 12").is_err());
        assert!(build("atr_pct_min = 0.05\natr_pct_max = 0.03").is_err());
        assert!(build("tp_mult = 0").is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let cfg = StrategyFileConfig::parse("[[strategy]]\ntype = \"macd\"\nname = \"m\"").unwrap();
        assert!(matches!(StrategyRegistry::from_config(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let cfg = StrategyFileConfig::parse(
            "[[strategy]]\ntype = \"ema_cross\"\nname = \"a\"\n[[strategy]]\ntype = \"rsi_reversal\"\nname = \"a\"",
        )
        .unwrap();
        assert!(StrategyRegistry::from_config(&cfg).is_err());
    }

    #[test]
    fn bad_params_are_rejected() {
        let cfg = StrategyFileConfig::parse(
            "[[strategy]]\ntype = \"ema_cross\"\nname = \"e\"\n[strategy.params]\nfast = 30\nslow = 10",
        )
        .unwrap();
        assert!(StrategyRegistry::from_config(&cfg).is_err());

        let cfg = StrategyFileConfig::parse(
            "[[strategy]]\ntype = \"range_reentry\"\nname = \"r\"\n[strategy.params]\ntimezone = \"Mars/Olympus\"",
        )
        .unwrap();
        assert!(StrategyRegistry::from_config(&cfg).is_err());

        let cfg = StrategyFileConfig::parse("[[strategy]]\ntype = \"price_threshold\"\nname = \"p\"").unwrap();
        assert!(StrategyRegistry::from_config(&cfg).is_err());
    }

    #[test]
    fn unrestricted_strategy_applies_everywhere() {
        let registry = StrategyRegistry::from_config(&StrategyFileConfig::builtin()).unwrap();
        assert!(registry.iter().all(|s| s.applies_to("DOGEUSDT")));
    }
}
