use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use common::{Error, Result};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "ema_cross"
/// name = "scalp_ema_cross_5m"
/// timeframe = "5m"
///
/// [strategy.params]
/// fast = 9
/// slow = 21
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type identifier, see `registry::build_strategy`.
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Unique name shown in logs, notifications and fingerprints.
    pub name: String,
    /// Candle interval, e.g. "5m".
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Restrict this strategy to these symbols. Empty = every configured pair.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Emit at most one accepted signal per symbol for the process lifetime.
    #[serde(default)]
    pub fire_once: bool,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

fn default_timeframe() -> String {
    "5m".to_string()
}

fn default_enabled() -> bool {
    true
}

impl StrategyConfig {
    fn new(strategy_type: &str, name: &str, timeframe: &str) -> Self {
        Self {
            strategy_type: strategy_type.to_string(),
            name: name.to_string(),
            timeframe: timeframe.to_string(),
            enabled: true,
            symbols: Vec::new(),
            fire_once: false,
            params: HashMap::new(),
        }
    }

    fn param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

impl StrategyFileConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse strategy config: {e}")))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{}': {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Load from `path`, or use the built-in list when the file does not exist.
    pub fn load_or_builtin(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No strategy config file, using built-in strategies");
            Ok(Self::builtin())
        }
    }

    /// The default strategy set. The price-threshold trigger ships disabled.
    pub fn builtin() -> Self {
        let mut threshold = StrategyConfig::new("price_threshold", "btc_price_gt_threshold", "1m")
            .param("threshold", 100_000.0)
            .param("band_pct", 0.02);
        threshold.enabled = false;
        threshold.fire_once = true;
        threshold.symbols = vec!["BTCUSDT".to_string()];

        Self {
            strategies: vec![
                threshold,
                StrategyConfig::new("ema_cross", "scalp_ema_cross_5m", "5m")
                    .param("fast", 9)
                    .param("slow", 21),
                StrategyConfig::new("trend_pullback", "trend_pullback_5m", "5m")
                    .param("fast", 50)
                    .param("slow", 200),
                StrategyConfig::new("range_reentry", "four_hour_reentry_5m", "5m")
                    .param("timezone", "America/New_York")
                    .param("session_start_hour", 0)
                    .param("session_end_hour", 4)
                    .param("reward_ratio", 2.0),
                StrategyConfig::new("rsi_reversal", "rsi_reversal_5m", "5m")
                    .param("period", 14)
                    .param("overbought", 70.0)
                    .param("oversold", 30.0),
                StrategyConfig::new("macd_retest", "macd_retest_5m", "5m")
                    .param("fast", 12)
                    .param("slow", 26)
                    .param("signal", 9)
                    .param("retest_period", 20)
                    .param("bias_period", 200)
                    .param("atr_pct_min", 0.0015)
                    .param("atr_pct_max", 0.03),
            ],
        }
    }
}
