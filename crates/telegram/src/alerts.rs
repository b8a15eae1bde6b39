use teloxide::prelude::*;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use common::AdvisorEvent;

use crate::format::AlertFilter;

/// Forward noteworthy advisor events to every chat until the broadcast closes.
/// Delivery is best-effort: a failed send is logged and skipped.
pub async fn run_alerts(
    bot: Bot,
    chat_ids: Vec<ChatId>,
    mut events: broadcast::Receiver<AdvisorEvent>,
) {
    let mut filter = AlertFilter::default();
    info!(chats = chat_ids.len(), "Telegram alerts running");
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(text) = filter.alert_for(&event) {
                    send_alert(&bot, &chat_ids, &text).await;
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Alert receiver lagged — some events skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!("Telegram alerts stopped");
}

/// Send a proactive alert to all configured chat IDs.
pub async fn send_alert(bot: &Bot, chat_ids: &[ChatId], message: &str) {
    for &chat_id in chat_ids {
        if let Err(e) = bot.send_message(chat_id, message).await {
            warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram alert");
        }
    }
}
