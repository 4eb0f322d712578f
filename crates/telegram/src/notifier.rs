use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::Notifier;

/// Alerts waiting for delivery before new ones are dropped.
const QUEUE_CAPACITY: usize = 256;

/// Sends alerts to one Telegram chat from a background task, so the
/// trading loop never waits on the Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    tx: mpsc::Sender<String>,
}

impl TelegramNotifier {
    /// Start the forwarding task. Must be called inside a Tokio runtime.
    pub fn spawn(token: impl Into<String>, chat_id: i64) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
        let bot = Bot::new(token);
        let chat = ChatId(chat_id);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                send_alert(&bot, chat, &message).await;
            }
            info!("Telegram alert channel closed");
        });
        info!(chat_id, "Telegram notifier started");
        Self { tx }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, message: String) {
        info!(target: "alerts", "{message}");
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(message = %dropped, "Telegram queue full, alert dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Telegram forwarder stopped, alert dropped");
            }
        }
    }
}

/// Send one message, logging (not returning) any failure.
pub async fn send_alert(bot: &Bot, chat_id: ChatId, message: &str) {
    if let Err(e) = bot.send_message(chat_id, message).await {
        warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram alert");
    }
}
