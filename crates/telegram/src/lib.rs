//! Telegram delivery for bot alerts.

pub mod notifier;

pub use notifier::{send_alert, TelegramNotifier};
