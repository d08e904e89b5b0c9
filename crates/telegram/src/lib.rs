//! Telegram surface: the signal notifier sink and the operator command bot.

pub mod commands;
pub mod notifier;

pub use commands::{start_bot, BotDeps, Command};
pub use notifier::{format_signal, SendThrottle, TelegramNotifier};
