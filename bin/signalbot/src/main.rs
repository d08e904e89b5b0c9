use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backtest::{Backtester, ReplayConfig, SignalSelection};
use common::{CandleSource, Config, EngineCommand, LogFormat, SignalSink};
use dedup::{DedupGate, DedupStore, MemoryDedupStore, RedisDedupStore};
use engine::{
    BinanceKlineSource, FanoutSink, LogSink, Orchestrator, OrchestratorConfig, SignalPipeline, SignalStore,
};
use risk::{RiskAttacher, RiskConfig};
use strategy::{StrategyFileConfig, StrategyRegistry};
use telegram_bot::{start_bot, BotDeps, TelegramNotifier};

#[derive(Parser, Debug)]
#[command(name = "signalbot", about = "Kline signal bot: live polling and strategy backtests")]
struct Cli {
    /// Strategy file, overrides STRATEGY_CONFIG_PATH
    #[arg(long, global = true)]
    strategies: Option<String>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Cmd {
    /// Poll every configured pair and emit signals (default)
    Run,
    /// Replay one strategy over recent history and print the report as JSON
    Backtest {
        /// Registered strategy name
        #[arg(long)]
        strategy: String,

        /// Lookback in months, overrides BACKTEST_MONTHS
        #[arg(long)]
        months: Option<u32>,

        /// Comma-separated symbols, overrides PAIRS
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Score every signal on a bar instead of only the first
        #[arg(long)]
        all_signals: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let mut cfg = Config::from_env().context("invalid configuration")?;
    if let Some(path) = cli.strategies.clone() {
        cfg.strategy_config_path = path;
    }

    // ── Logging ──────────────────────────────────────────────────────────────
    init_logging(cfg.log_format);

    let registry = load_registry(&cfg)?;

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => run(cfg, registry).await,
        Cmd::Backtest {
            strategy,
            months,
            symbols,
            all_signals,
        } => {
            let selection = if all_signals {
                SignalSelection::All
            } else {
                SignalSelection::FirstOnly
            };
            backtest(cfg, registry, &strategy, months, symbols, selection).await
        }
    }
}

/// Logs go to stderr so `backtest` output on stdout stays machine-readable.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load_registry(cfg: &Config) -> anyhow::Result<StrategyRegistry> {
    let file = StrategyFileConfig::load_or_builtin(&cfg.strategy_config_path)?;
    let registry = StrategyRegistry::from_config(&file)?;
    if registry.is_empty() {
        warn!(path = %cfg.strategy_config_path, "No enabled strategies");
    }
    Ok(registry)
}

async fn run(cfg: Config, registry: StrategyRegistry) -> anyhow::Result<()> {
    info!(pairs = ?cfg.pairs, strategies = registry.len(), "SignalBot starting");

    // ── Market data ───────────────────────────────────────────────────────────
    let source: Arc<dyn CandleSource> = Arc::new(BinanceKlineSource::from_config(&cfg)?);

    // ── Dedup ─────────────────────────────────────────────────────────────────
    let dedup_store: Arc<dyn DedupStore> = match &cfg.redis_url {
        Some(url) => Arc::new(
            RedisDedupStore::connect(url)
                .await
                .context("failed to connect to dedup store")?,
        ),
        None => {
            warn!("REDIS_URL not set, dedup state is local to this process");
            Arc::new(MemoryDedupStore::new())
        }
    };
    let gate = DedupGate::new(dedup_store.clone(), cfg.dedup_ttl, cfg.dedup_failure_policy);
    info!(ttl_secs = cfg.dedup_ttl.as_secs(), policy = ?cfg.dedup_failure_policy, "Dedup gate ready");

    // ── Sinks ─────────────────────────────────────────────────────────────────
    let store = SignalStore::connect(&cfg.database_url)
        .await
        .context("failed to open signal store")?;
    let mut sinks: Vec<Arc<dyn SignalSink>> = vec![Arc::new(LogSink), Arc::new(store.clone())];

    let bot = cfg.telegram_token.as_deref().map(Bot::new);
    match (&bot, cfg.telegram_chat_id) {
        (Some(bot), Some(chat_id)) => {
            info!(chat_id, "Telegram notifications enabled");
            sinks.push(Arc::new(TelegramNotifier::new(bot.clone(), chat_id)));
        }
        (Some(_), None) => warn!("TELEGRAM_CHAT_ID not set, Telegram notifications disabled"),
        _ => {}
    }

    // ── Orchestrator ─────────────────────────────────────────────────────────
    let attacher = RiskAttacher::new(RiskConfig::with_multiples(cfg.atr_sl_mult, cfg.atr_tp_mult));
    let pipeline = SignalPipeline::new(attacher, gate, Arc::new(FanoutSink::new(sinks)));
    let (orchestrator, handle) = Orchestrator::new(
        OrchestratorConfig::from(&cfg),
        source.clone(),
        registry.clone(),
        pipeline,
    );
    let engine_task = tokio::spawn(orchestrator.run());

    // ── Telegram commands ─────────────────────────────────────────────────────
    if let Some(bot) = bot {
        if cfg.telegram_allowed_user_ids.is_empty() {
            warn!("TELEGRAM_ALLOWED_USER_IDS is empty, every command will be rejected");
        }
        let deps = BotDeps {
            handle: handle.clone(),
            registry: Arc::new(registry),
            backtester: Backtester::new(source.clone()),
            pairs: Arc::new(cfg.pairs.clone()),
            backtest_months: cfg.backtest_months,
            allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
        };
        tokio::spawn(start_bot(bot, deps));
    }

    // ── HTTP API ──────────────────────────────────────────────────────────────
    match &cfg.dashboard_token {
        Some(token) => {
            let state = api::AppState {
                store,
                handle: handle.clone(),
                dedup: dedup_store,
                dashboard_token: Arc::from(token.as_str()),
            };
            let port = cfg.dashboard_port;
            tokio::spawn(async move {
                if let Err(e) = api::serve(state, port).await {
                    error!(error = %e, "HTTP API stopped");
                }
            });
        }
        None => info!("DASHBOARD_TOKEN not set, HTTP API disabled"),
    }

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("Shutdown signal received");

    handle.send(EngineCommand::Stop).await;
    engine_task.await.context("orchestrator task panicked")?;
    info!("SignalBot stopped");
    Ok(())
}

async fn backtest(
    cfg: Config,
    registry: StrategyRegistry,
    name: &str,
    months: Option<u32>,
    symbols: Vec<String>,
    selection: SignalSelection,
) -> anyhow::Result<()> {
    let Some(entry) = registry.get(name) else {
        bail!("unknown strategy '{name}', registered: {}", registry.names().join(", "));
    };
    let months = months.unwrap_or(cfg.backtest_months);
    let symbols: Vec<String> = if symbols.is_empty() {
        cfg.pairs.clone()
    } else {
        symbols.iter().map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect()
    };

    let source: Arc<dyn CandleSource> = Arc::new(BinanceKlineSource::from_config(&cfg)?);
    let replay_cfg = ReplayConfig {
        selection,
        ..ReplayConfig::default()
    };
    let report = Backtester::with_config(source, replay_cfg)
        .run(entry, &symbols, months)
        .await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
