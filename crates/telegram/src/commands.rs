use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use backtest::Backtester;
use common::{EngineCommand, EngineState};
use engine::{OrchestratorHandle, StatsSnapshot};
use strategy::StrategyRegistry;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub handle: OrchestratorHandle,
    pub registry: Arc<StrategyRegistry>,
    pub backtester: Backtester,
    /// Symbols a `/backtest` runs over.
    pub pairs: Arc<Vec<String>>,
    pub backtest_months: u32,
    pub allowed_user_ids: Arc<Vec<i64>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "SignalBot commands:")]
pub enum Command {
    #[command(description = "Show this help")]
    Help,
    #[command(description = "Show engine state and counters")]
    Status,
    #[command(description = "List registered strategies")]
    Strategies,
    #[command(description = "Backtest a strategy over the configured pairs: /backtest <name>")]
    Backtest(String),
    #[command(description = "Suspend evaluation")]
    Pause,
    #[command(description = "Resume evaluation")]
    Resume,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(handle_help))
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Strategies].endpoint(handle_strategies))
        .branch(case![Command::Backtest(name)].endpoint(handle_backtest))
        .branch(case![Command::Pause].endpoint(handle_pause))
        .branch(case![Command::Resume].endpoint(handle_resume));

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = is_allowed(&deps.allowed_user_ids, uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

fn is_allowed(allowed: &[i64], uid: i64) -> bool {
    allowed.contains(&uid)
}

async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
    Ok(())
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let state = deps.handle.state().await;
    let text = status_text(state, &deps.handle.stats(), deps.registry.len(), deps.pairs.len());
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_strategies(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    bot.send_message(msg.chat.id, strategies_text(&deps.registry)).await?;
    Ok(())
}

async fn handle_backtest(bot: Bot, msg: Message, name: String, deps: Arc<BotDeps>) -> HandlerResult {
    let name = name.trim();
    if name.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /backtest <strategy>").await?;
        return Ok(());
    }
    let Some(entry) = deps.registry.get(name) else {
        bot.send_message(msg.chat.id, format!("Unknown strategy '{name}'. Try /strategies."))
            .await?;
        return Ok(());
    };

    info!(strategy = %name, months = deps.backtest_months, "Backtest requested via Telegram");
    bot.send_message(
        msg.chat.id,
        format!("Backtesting {name} over {} months\u{2026}", deps.backtest_months),
    )
    .await?;

    let report = deps.backtester.run(entry, &deps.pairs, deps.backtest_months).await;
    bot.send_message(msg.chat.id, report.summary()).await?;
    Ok(())
}

async fn handle_pause(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let reply = match deps.handle.state().await {
        EngineState::Running => {
            deps.handle.send(EngineCommand::Pause).await;
            "Evaluation paused."
        }
        EngineState::Paused => "Already paused.",
        EngineState::Stopped => "Engine is stopped.",
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_resume(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let reply = match deps.handle.state().await {
        EngineState::Paused => {
            deps.handle.send(EngineCommand::Resume).await;
            "Evaluation resumed."
        }
        EngineState::Running => "Already running.",
        EngineState::Stopped => "Engine is stopped.",
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

fn status_text(state: EngineState, stats: &StatsSnapshot, strategies: usize, pairs: usize) -> String {
    format!(
        "SignalBot Status\n\
         Engine: {state}\n\
         Pairs: {pairs} | Strategies: {strategies}\n\
         Sweeps: {} (overruns {})\n\
         Signals: {} accepted, {} duplicate, {} rejected\n\
         Pair errors: {}",
        stats.sweeps, stats.overruns, stats.accepted, stats.duplicates, stats.rejected, stats.pair_errors
    )
}

fn strategies_text(registry: &StrategyRegistry) -> String {
    if registry.is_empty() {
        return "No strategies registered.".to_string();
    }
    let mut out = String::from("Strategies:");
    for entry in registry.iter() {
        out.push_str(&format!("\n- {} ({})", entry.name(), entry.strategy.timeframe()));
        if entry.fire_once {
            out.push_str(" [once]");
        }
        if !entry.symbols.is_empty() {
            out.push_str(&format!(" [{}]", entry.symbols.join(", ")));
        }
    }
    out
}
