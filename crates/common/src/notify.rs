use tracing::info;

/// Outbound alert sink. Delivery is fire-and-forget: implementations must
/// not block the caller and never report failures back.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: String);
}

/// Notifier used when no chat integration is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: String) {
        info!(target: "alerts", "{message}");
    }
}
