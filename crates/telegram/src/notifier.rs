use std::time::Duration;

use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html::escape;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use common::{Error, PricedSignal, Result, SignalSink};

/// Telegram's per-chat limit is about one message per second.
const MIN_GAP: Duration = Duration::from_secs(1);

/// Spaces out sends so that at most one leaves per `min_gap`.
///
/// Callers queue on the lock, so concurrent deliveries go out in order.
#[derive(Debug)]
pub struct SendThrottle {
    min_gap: Duration,
    next: Mutex<Option<Instant>>,
}

impl SendThrottle {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            next: Mutex::new(None),
        }
    }

    /// Wait until the next send slot and claim it.
    pub async fn acquire(&self) {
        let mut next = self.next.lock().await;
        if let Some(at) = *next {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next = Some(Instant::now() + self.min_gap);
    }
}

/// HTML message body for one accepted signal.
pub fn format_signal(s: &PricedSignal) -> String {
    format!(
        "<b>{}</b> - <b>{}</b>\n\
         TF: <code>{}</code> | Strategy: <code>{}</code>\n\
         Entry: <code>{:.4}</code>\n\
         SL: <code>{:.4}</code> | TP: <code>{:.4}</code>\n\
         Time: <code>{}</code>\n\
         Reason: {}",
        escape(&s.symbol),
        s.side,
        escape(&s.timeframe),
        escape(&s.strategy),
        s.entry,
        s.sl,
        s.tp,
        s.entry_time_utc().format("%Y-%m-%d %H:%M UTC"),
        escape(&s.reason),
    )
}

/// Sink that posts accepted signals to one Telegram chat.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
    throttle: SendThrottle,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
            throttle: SendThrottle::new(MIN_GAP),
        }
    }
}

#[async_trait]
impl SignalSink for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, signal: &PricedSignal) -> Result<()> {
        self.throttle.acquire().await;
        match self
            .bot
            .send_message(self.chat_id, format_signal(signal))
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => {
                debug!(symbol = %signal.symbol, strategy = %signal.strategy, "Telegram notification sent");
                Ok(())
            }
            Err(e) => {
                warn!(symbol = %signal.symbol, strategy = %signal.strategy, error = %e, "Telegram send failed");
                Err(Error::Notify(e.to_string()))
            }
        }
    }
}
